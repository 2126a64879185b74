//! Mock oracle for unit tests
//!
//! Returns scripted responses in order and records every prompt so tests
//! can assert on call counts and content. Test-only.

#![cfg(test)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{Oracle, OracleError, OracleRequest};

/// One scripted reply.
pub enum Scripted {
    Text(String),
    Error(OracleError),
}

#[derive(Clone)]
pub struct MockOracle {
    responses: Arc<Mutex<VecDeque<Scripted>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    available: bool,
}

impl MockOracle {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            available: true,
        }
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Scripted::Text(text.into()));
    }

    pub fn push_error(&self, error: OracleError) {
        self.responses.lock().unwrap().push_back(Scripted::Error(error));
    }

    /// Every prompt seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Oracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());

        match self.responses.lock().unwrap().pop_front() {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Error(err)) => Err(err),
            None => Err(OracleError::timeout(Duration::from_secs(0))),
        }
    }
}
