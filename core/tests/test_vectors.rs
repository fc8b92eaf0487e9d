//! Verify typed operations against JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs, the expected request, a simulated
//! response, and the expected decode result or error. A replaying transport
//! stands in for the network. Comparing parsed JSON (not raw strings) avoids
//! false negatives from field-ordering differences.

use std::cell::RefCell;

use cimi_client::{
    CimiClient, CimiError, Credentials, HttpMethod, HttpRequest, HttpResponse, Machine,
    MachineCreate, Transport,
};

const BASE_URL: &str = "http://localhost:3000";

/// Returns one canned response and remembers the request that asked for it.
struct ReplayTransport {
    response: HttpResponse,
    request: RefCell<Option<HttpRequest>>,
}

impl Transport for ReplayTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, CimiError> {
        *self.request.borrow_mut() = Some(request.clone());
        Ok(self.response.clone())
    }
}

/// Client that will answer its next request with `case["simulated_response"]`.
fn client(case: &serde_json::Value) -> CimiClient<ReplayTransport> {
    let sim = &case["simulated_response"];
    let transport = ReplayTransport {
        response: HttpResponse {
            status: sim["status"].as_u64().unwrap() as u16,
            headers: Vec::new(),
            body: sim["body"].as_str().unwrap().to_string(),
        },
        request: RefCell::new(None),
    };
    CimiClient::with_transport(BASE_URL, Some(Credentials::basic("admin", "secret")), transport)
        .unwrap()
}

/// Parse the method string from test vectors into `HttpMethod`.
fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

/// Compare the request the client sent with `case["expected_request"]`.
fn assert_request(c: &CimiClient<ReplayTransport>, case: &serde_json::Value) {
    let name = case["name"].as_str().unwrap();
    let expected = &case["expected_request"];
    let req = c.transport().request.borrow().clone().expect("no request sent");

    assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
    assert_eq!(req.url, format!("{BASE_URL}{}", expected["path"].as_str().unwrap()), "{name}: url");

    let expected_headers: Vec<(String, String)> = expected["headers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| {
            let arr = h.as_array().unwrap();
            (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
        })
        .collect();
    assert_eq!(req.headers, expected_headers, "{name}: headers");

    match expected.get("body") {
        Some(expected_body) => {
            let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
            assert_eq!(&body, expected_body, "{name}: body");
        }
        None => assert!(req.body.is_none(), "{name}: body should be None"),
    }
}

/// Check a decode result against `expected_result` or `expected_error`.
fn assert_outcome<T>(result: Result<T, CimiError>, case: &serde_json::Value)
where
    T: std::fmt::Debug + PartialEq + serde::de::DeserializeOwned,
{
    let name = case["name"].as_str().unwrap();
    if let Some(expected_error) = case.get("expected_error") {
        let err = result.unwrap_err();
        match expected_error.as_str().unwrap() {
            "NotFound" => assert!(matches!(err, CimiError::NotFound), "{name}: expected NotFound, got {err:?}"),
            "Status" => assert!(matches!(err, CimiError::Status { .. }), "{name}: expected Status, got {err:?}"),
            "Deserialization" => assert!(
                matches!(err, CimiError::Deserialization(_)),
                "{name}: expected Deserialization, got {err:?}"
            ),
            other => panic!("{name}: unknown expected_error: {other}"),
        }
    } else {
        let expected: T = serde_json::from_value(case["expected_result"].clone()).unwrap();
        assert_eq!(result.unwrap(), expected, "{name}: parsed result");
    }
}

fn cases(raw: &str) -> Vec<serde_json::Value> {
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

#[test]
fn list_test_vectors() {
    for case in cases(include_str!("../../test-vectors/list.json")) {
        let c = client(&case);
        let result = c.machines();
        assert_request(&c, &case);
        assert_outcome::<Vec<Machine>>(result, &case);
    }
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

#[test]
fn get_test_vectors() {
    for case in cases(include_str!("../../test-vectors/get.json")) {
        let c = client(&case);
        let result = c.machine(case["input_id"].as_str().unwrap());
        assert_request(&c, &case);
        assert_outcome::<Machine>(result, &case);
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[test]
fn create_test_vectors() {
    for case in cases(include_str!("../../test-vectors/create.json")) {
        let input: MachineCreate = serde_json::from_value(case["input"].clone()).unwrap();
        let c = client(&case);
        let result = c.create_machine(&input);
        assert_request(&c, &case);
        assert_outcome::<Machine>(result, &case);
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[test]
fn update_test_vectors() {
    for case in cases(include_str!("../../test-vectors/update.json")) {
        let input: Machine = serde_json::from_value(case["input"].clone()).unwrap();
        let c = client(&case);
        let result = c.update_machine(&input);
        assert_request(&c, &case);
        assert_outcome::<Machine>(result, &case);
    }
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[test]
fn delete_test_vectors() {
    for case in cases(include_str!("../../test-vectors/delete.json")) {
        let c = client(&case);
        let result = c.delete_machine(case["input_id"].as_str().unwrap());
        assert_request(&c, &case);
        assert_outcome::<bool>(result, &case);
    }
}
