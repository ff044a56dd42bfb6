//! Mock content-fetch collaborator.

use async_trait::async_trait;
use glossa_delivery::{ContentFetcher, Credentials, FetchError};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Scripted behavior for one `{project}:{language}` pair.
#[derive(Clone, Debug)]
pub enum FetchPlan {
    /// Return generated content.
    Ok,
    /// Sleep, then return generated content. For keeping a job in flight.
    Delayed(Duration),
    /// Always fail with an upstream client error.
    ClientError(u16, String),
    /// Transport-fail the first `n` calls, then return content.
    FailTimes(u32),
    /// Transport-fail every call.
    AlwaysFail,
}

/// Mock upstream provider. Content is generated from the fetch arguments
/// plus a bumpable version counter, so tests can force "changed upstream
/// content" without re-scripting.
pub struct MockFetcher {
    calls: AtomicU64,
    version: AtomicU64,
    plans: Mutex<HashMap<String, FetchPlan>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU64::new(0),
            version: AtomicU64::new(1),
            plans: Mutex::new(HashMap::new()),
        })
    }

    pub async fn set_plan(&self, project: &str, language: &str, plan: FetchPlan) {
        self.plans
            .lock()
            .await
            .insert(format!("{project}:{language}"), plan);
    }

    /// Change what "upstream" would return for every key.
    pub fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of fetch calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn content(&self, function: &str, args: &[Value]) -> Value {
        json!({
            "function": function,
            "args": args,
            "version": self.version.load(Ordering::SeqCst),
        })
    }
}

#[async_trait]
impl ContentFetcher for MockFetcher {
    async fn fetch(
        &self,
        function: &str,
        _credentials: &Credentials,
        args: &[Value],
    ) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let project = args.first().and_then(Value::as_str).unwrap_or_default();
        let language = args.get(1).and_then(Value::as_str).unwrap_or_default();
        let plan_key = format!("{project}:{language}");

        let plan = {
            let mut plans = self.plans.lock().await;
            match plans.get_mut(&plan_key) {
                Some(FetchPlan::FailTimes(remaining)) => {
                    if *remaining > 0 {
                        *remaining -= 1;
                        FetchPlan::AlwaysFail
                    } else {
                        FetchPlan::Ok
                    }
                }
                Some(plan) => plan.clone(),
                None => FetchPlan::Ok,
            }
        };

        match plan {
            FetchPlan::Ok => Ok(self.content(function, args)),
            FetchPlan::Delayed(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.content(function, args))
            }
            FetchPlan::ClientError(code, message) => Err(FetchError::with_status(code, message)),
            FetchPlan::AlwaysFail | FetchPlan::FailTimes(_) => {
                Err(FetchError::transport("connection reset by upstream"))
            }
        }
    }
}
