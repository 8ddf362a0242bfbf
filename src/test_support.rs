//! In-memory transport for unit tests.
use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use reqwest::StatusCode;

use crate::{
    transport::{HttpRequest, HttpResponse, Transport, TransportError},
    Client, ClientConfig,
};

pub(crate) type Scripted = Result<HttpResponse, TransportError>;

/// Replays scripted responses in order, then repeats the last configured one (if any), recording
/// every request it receives.
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    repeat: Option<Scripted>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Vec<Scripted>) -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport {
            script: Mutex::new(script.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn repeating(response: Scripted) -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(response),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: HttpRequest) -> Scripted {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        next.or_else(|| self.repeat.clone())
            .expect("no scripted response left")
    }
}

pub(crate) fn ok_json(body: &str) -> Scripted {
    Ok(HttpResponse::new(StatusCode::OK, body))
}

pub(crate) fn status(code: u16) -> Scripted {
    Ok(HttpResponse::new(
        StatusCode::from_u16(code).unwrap(),
        Vec::new(),
    ))
}

pub(crate) fn network_failure() -> Scripted {
    Err(TransportError::network(io::Error::new(
        io::ErrorKind::ConnectionRefused,
        "connection refused",
    )))
}

/// A client that talks to `transport` and never actually sleeps between retries.
pub(crate) fn client(transport: &Arc<ScriptedTransport>, config: ClientConfig) -> Client {
    config
        .transport(Arc::clone(transport))
        .sleep(|_: Duration| {})
        .to_client()
        .unwrap()
}
