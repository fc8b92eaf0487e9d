//! Full lifecycle tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then exercises the client over
//! real HTTP through the default `UreqTransport`. The server rejects any
//! request missing `CIMI-Specification-Version` or valid credentials, so
//! every successful call here also checks the protocol headers.

use cimi_client::{
    CimiClient, CimiError, ClientConfig, Credentials, HttpMethod, HttpRequest, Machine,
    MachineAction, MachineCreate, MachineState, MachineTemplate, Transport, Volume,
    SPEC_VERSION, SPEC_VERSION_HEADER,
};

/// Start the mock server on a random port and return its base URL.
fn spawn_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn admin() -> Credentials {
    Credentials::basic(mock_server::DEFAULT_USERNAME, mock_server::DEFAULT_PASSWORD)
}

fn small_template() -> MachineTemplate {
    MachineTemplate {
        href: Some("/machineTemplates/small".to_string()),
        ..MachineTemplate::default()
    }
}

#[test]
fn machine_lifecycle() {
    let client = CimiClient::new(&spawn_server(), admin()).unwrap();

    // Step 1: list — should be empty.
    assert!(client.machines().unwrap().is_empty(), "expected empty list");

    // Step 2: create.
    let mut create = MachineCreate::new("vm-1", small_template());
    create.description = Some("integration test".to_string());
    let created = client.create_machine(&create).unwrap();
    assert_eq!(created.name, "vm-1");
    assert_eq!(created.state, Some(MachineState::Stopped));
    assert_eq!(created.id.as_deref(), Some("/machines/vm-1"));

    // Step 3: get.
    let fetched = client.machine("vm-1").unwrap();
    assert_eq!(fetched, created);

    // Step 4: update description, server keeps its own fields.
    let mut changed = fetched.clone();
    changed.description = Some("resized".to_string());
    changed.properties.insert("tier".to_string(), "web".to_string());
    let updated = client.update_machine(&changed).unwrap();
    assert_eq!(updated.description.as_deref(), Some("resized"));
    assert_eq!(updated.properties.get("tier").map(String::as_str), Some("web"));
    assert_eq!(updated.state, Some(MachineState::Stopped));

    // Step 5: start.
    assert!(client.machine_action("vm-1", MachineAction::Start).unwrap());
    assert_eq!(client.machine("vm-1").unwrap().state, Some(MachineState::Started));

    // Step 6: list — one machine.
    let machines = client.machines().unwrap();
    assert_eq!(machines.len(), 1);
    assert_eq!(machines[0].name, "vm-1");

    // Step 7: raw dispatch with lazy decode.
    let response = client.dispatch_empty(HttpMethod::Get, "/machines").unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.collection().unwrap().count, Some(1));
    let raw: serde_json::Value = response.entity().unwrap();
    assert_eq!(raw["machines"][0]["name"], "vm-1");

    // Step 8: delete.
    assert!(client.delete_machine("vm-1").unwrap());

    // Step 9: get after delete — NotFound.
    let err = client.machine("vm-1").unwrap_err();
    assert!(matches!(err, CimiError::NotFound));

    // Step 10: delete and act again — false, not an error.
    assert!(!client.delete_machine("vm-1").unwrap());
    assert!(!client.machine_action("vm-1", MachineAction::Stop).unwrap());

    // Step 11: list — empty again.
    assert!(client.machines().unwrap().is_empty(), "expected empty list after delete");

    client.shutdown();
}

#[test]
fn names_needing_escapes_round_trip() {
    let client = CimiClient::new(&spawn_server(), admin()).unwrap();

    let created = client
        .create_machine(&MachineCreate::new("web 01", small_template()))
        .unwrap();
    assert_eq!(created.name, "web 01");
    assert_eq!(client.machine("web 01").unwrap().name, "web 01");
    assert!(client.delete_machine("web 01").unwrap());

    client.shutdown();
}

#[test]
fn volumes_through_generic_operations() {
    let client = CimiClient::new(&spawn_server(), admin()).unwrap();

    let volume: Volume = client
        .create(&serde_json::json!({"name": "data", "capacity": 2048}))
        .unwrap();
    assert_eq!(volume.capacity, Some(2048));

    let volumes = client.volumes().unwrap();
    assert_eq!(volumes, vec![volume.clone()]);
    assert_eq!(client.volume("data").unwrap(), volume);

    // A volume listing never yields machines.
    let url = client.model_url("volumes").unwrap();
    let machines: Vec<Machine> = client.get_model_collection(&url).unwrap();
    assert!(machines.is_empty());

    assert!(client.delete_volume("data").unwrap());
    assert!(client.volumes().unwrap().is_empty());

    client.shutdown();
}

#[test]
fn rotated_credentials_apply_to_next_request() {
    let client = CimiClient::new(&spawn_server(), Credentials::basic("admin", "stale")).unwrap();

    let err = client.machines().unwrap_err();
    assert!(matches!(err, CimiError::Status { status: 401, .. }));

    client.set_credentials(admin()).unwrap();
    assert!(client.machines().unwrap().is_empty());

    client.clear_credentials();
    assert_eq!(client.machines().unwrap_err().status(), Some(401));

    client.shutdown();
}

#[test]
fn client_from_config() {
    let config = ClientConfig::new(format!("{}/", spawn_server()))
        .credentials(admin())
        .timeout_secs(5);
    let client = CimiClient::from_config(&config).unwrap();
    assert!(!client.base_url().ends_with('/'));
    assert!(client.machines().unwrap().is_empty());
    client.shutdown();
}

#[test]
fn transport_clone_keeps_pool_after_shutdown() {
    let base_url = spawn_server();
    let client = CimiClient::new(&base_url, admin()).unwrap();
    let transport = client.transport().clone();
    client.shutdown();

    let request = HttpRequest {
        method: HttpMethod::Get,
        url: format!("{base_url}/machines"),
        headers: vec![
            (SPEC_VERSION_HEADER.to_string(), SPEC_VERSION.to_string()),
            ("authorization".to_string(), admin().authorization().unwrap()),
        ],
        body: None,
    };
    assert_eq!(transport.execute(&request).unwrap().status, 200);
}

#[test]
fn unreachable_endpoint_is_a_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let client = CimiClient::new(&format!("http://{addr}"), admin()).unwrap();

    let err = client.delete_machine("vm-1").unwrap_err();
    assert!(matches!(err, CimiError::Transport(_)));
}
