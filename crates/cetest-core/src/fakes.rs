//! In-memory [`CompileService`] for tests and dry runs
//!
//! `ScriptedService` answers compiles from a per-compiler script and keeps
//! a log of every compiler it was asked about.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use ce_client::{
    CancellationToken, CeError, CompileRequest, CompileResponse, CompileService, CompilerRecord,
};

/// Scripted result for one compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Ok,
    Fail,
    Timeout,
    Transport,
    /// A malformed response that is neither a fault nor a compile result
    Error,
}

#[derive(Debug, Default)]
struct State {
    outcomes: HashMap<String, Scripted>,
    calls: Vec<CompileRequest>,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// Fake compilation service with scripted per-compiler outcomes.
///
/// Compilers without a script compile fine.
#[derive(Debug, Default)]
pub struct ScriptedService {
    catalog: Vec<CompilerRecord>,
    state: Mutex<State>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedService {
    pub fn new(catalog: Vec<CompilerRecord>) -> Self {
        Self {
            catalog,
            state: Mutex::default(),
        }
    }

    pub fn script(&self, compiler_id: &str, outcome: Scripted) -> &Self {
        lock(&self.state)
            .outcomes
            .insert(compiler_id.to_string(), outcome);
        self
    }

    /// Cancel `token` once `calls` compiles have been answered.
    pub fn cancel_after(&self, calls: usize, token: CancellationToken) -> &Self {
        lock(&self.state).cancel_after = Some((calls, token));
        self
    }

    pub fn call_count(&self) -> usize {
        lock(&self.state).calls.len()
    }

    /// Compiler ids in call order.
    pub fn called_ids(&self) -> Vec<String> {
        lock(&self.state)
            .calls
            .iter()
            .map(|r| r.compiler_id.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<CompileRequest> {
        lock(&self.state).calls.clone()
    }
}

#[async_trait]
impl CompileService for ScriptedService {
    async fn list_compilers(&self, cancel: &CancellationToken) -> ce_client::Result<Vec<CompilerRecord>> {
        if cancel.is_cancelled() {
            return Err(CeError::Cancelled);
        }
        Ok(self.catalog.clone())
    }

    async fn compile(
        &self,
        request: &CompileRequest,
        cancel: &CancellationToken,
    ) -> ce_client::Result<CompileResponse> {
        if cancel.is_cancelled() {
            return Err(CeError::Cancelled);
        }
        let mut state = lock(&self.state);
        state.calls.push(request.clone());
        if let Some((after, token)) = &state.cancel_after {
            if state.calls.len() >= *after {
                token.cancel();
            }
        }

        let url = format!("fake:///api/compiler/{}/compile", request.compiler_id);
        match state.outcomes.get(&request.compiler_id) {
            None | Some(Scripted::Ok) => Ok(CompileResponse {
                code: 0,
                stderr: String::new(),
            }),
            Some(Scripted::Fail) => Ok(CompileResponse {
                code: 1,
                stderr: format!("<source>:1:1: error: rejected by {}", request.compiler_id),
            }),
            Some(Scripted::Timeout) => Err(CeError::Timeout {
                url,
                detail: "scripted timeout".into(),
            }),
            Some(Scripted::Transport) => Err(CeError::Connection {
                url,
                detail: "scripted connection reset".into(),
            }),
            Some(Scripted::Error) => Err(CeError::Config("scripted malformed response".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_compilers_succeed() {
        let svc = ScriptedService::new(Vec::new());
        svc.script("bad", Scripted::Fail);
        let cancel = CancellationToken::new();
        let req = |id: &str| CompileRequest {
            compiler_id: id.into(),
            source: "int main() {}".into(),
            user_arguments: String::new(),
            libraries: Vec::new(),
        };

        assert!(svc.compile(&req("good"), &cancel).await.unwrap().ok());
        assert!(!svc.compile(&req("bad"), &cancel).await.unwrap().ok());
        assert_eq!(svc.called_ids(), vec!["good", "bad"]);
    }

    #[tokio::test]
    async fn test_cancel_after_fires_token() {
        let svc = ScriptedService::new(Vec::new());
        let cancel = CancellationToken::new();
        svc.cancel_after(1, cancel.clone());
        let req = CompileRequest {
            compiler_id: "g1".into(),
            source: String::new(),
            user_arguments: String::new(),
            libraries: Vec::new(),
        };

        svc.compile(&req, &cancel).await.unwrap();
        assert!(cancel.is_cancelled());
        assert!(matches!(
            svc.compile(&req, &cancel).await,
            Err(CeError::Cancelled)
        ));
        assert_eq!(svc.call_count(), 1);
    }
}
