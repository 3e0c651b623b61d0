//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

use crate::delivery::{Endpoint, EndpointResponse, QsoRequest, TransportError};

/// An endpoint that plays back a fixed script of results and records every
/// request it sees. Once the script runs out it answers HTTP 200.
#[derive(Debug, Default)]
pub struct ScriptedEndpoint {
    script: Mutex<VecDeque<Result<EndpointResponse, TransportError>>>,
    calls: Mutex<Vec<(Instant, QsoRequest)>>,
}

impl ScriptedEndpoint {
    pub fn new(script: Vec<Result<EndpointResponse, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::default(),
        }
    }

    /// A response with the given status and an empty JSON body.
    pub fn status(status: u16) -> EndpointResponse {
        EndpointResponse {
            status,
            body: "{}".to_string(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    /// The ADIF strings of every request, in order.
    pub fn records(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.string.clone())
            .collect()
    }
}

impl Endpoint for ScriptedEndpoint {
    async fn post(&self, request: &QsoRequest) -> Result<EndpointResponse, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Self::status(200)))
    }
}
