//! Pre/post mutation hooks
//!
//! User hooks are async closures. Pre hooks return `anyhow::Result<Option<Value>>`:
//!
//! - `Ok(Some(body))` proceeds with `body`
//! - `Ok(Some(Value::Null))` explicitly denies the mutation (403)
//! - `Ok(None)` means the hook forgot to return a body (403 with a detail)
//! - `Err(e)` fails the request with 400, unless `e` is an [`ApiError`]
//!
//! The pipeline never looks at those raw shapes; [`classify_pre`] folds them
//! into a [`HookOutcome`] first.

use crate::core::auth::{Operation, Requester};
use crate::core::error::{ApiError, ApiResult, ErrorKind};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Input of a pre hook
#[derive(Debug, Clone)]
pub struct PreHookArgs {
    /// Proposed body; for deletes, the document about to be removed
    pub body: Value,
    pub requester: Option<Requester>,
    /// Loaded document for updates and deletes
    pub existing: Option<Value>,
}

/// Input of a post hook
#[derive(Debug, Clone)]
pub struct PostHookArgs {
    /// Persisted (and populated) document
    pub result: Value,
    /// Body that was written
    pub body: Value,
    pub requester: Option<Requester>,
    /// Snapshot taken before the mutation
    pub previous: Option<Value>,
}

pub type PreHookFn =
    Arc<dyn Fn(PreHookArgs) -> BoxFuture<'static, anyhow::Result<Option<Value>>> + Send + Sync>;
pub type PostHookFn =
    Arc<dyn Fn(PostHookArgs) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Result of running a pre hook
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    Proceed(Value),
    Deny,
    Fail(ApiError),
}

impl HookOutcome {
    /// Turn the outcome into the body to persist or the error to return
    pub fn into_result(self, operation: Operation) -> ApiResult<Value> {
        match self {
            HookOutcome::Proceed(body) => Ok(body),
            HookOutcome::Deny => {
                Err(ApiError::not_allowed(format!("{} not allowed", operation.label())))
            }
            HookOutcome::Fail(err) => Err(err),
        }
    }
}

/// Fold a raw pre hook return into a [`HookOutcome`]
pub fn classify_pre(operation: Operation, result: anyhow::Result<Option<Value>>) -> HookOutcome {
    let label = operation.label();
    match result {
        Ok(Some(Value::Null)) => HookOutcome::Deny,
        Ok(Some(body)) => HookOutcome::Proceed(body),
        Ok(None) => HookOutcome::Fail(
            ApiError::not_allowed(format!("{label} not allowed"))
                .with_detail(format!("A body must be returned from pre{label}")),
        ),
        Err(err) => HookOutcome::Fail(ApiError::from_stage(
            ErrorKind::InvalidRequest,
            format!("pre{label} hook error"),
            err,
        )),
    }
}

/// Hooks configured for one resource
#[derive(Clone, Default)]
pub struct Hooks {
    pre_create: Option<PreHookFn>,
    pre_update: Option<PreHookFn>,
    pre_delete: Option<PreHookFn>,
    post_create: Option<PostHookFn>,
    post_update: Option<PostHookFn>,
    post_delete: Option<PostHookFn>,
}

fn boxed_pre<F, Fut>(f: F) -> PreHookFn
where
    F: Fn(PreHookArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

fn boxed_post<F, Fut>(f: F) -> PostHookFn
where
    F: Fn(PostHookArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre_create<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PreHookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        self.pre_create = Some(boxed_pre(f));
        self
    }

    pub fn pre_update<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PreHookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        self.pre_update = Some(boxed_pre(f));
        self
    }

    pub fn pre_delete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PreHookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        self.pre_delete = Some(boxed_pre(f));
        self
    }

    pub fn post_create<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PostHookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.post_create = Some(boxed_post(f));
        self
    }

    pub fn post_update<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PostHookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.post_update = Some(boxed_post(f));
        self
    }

    pub fn post_delete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PostHookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.post_delete = Some(boxed_post(f));
        self
    }

    fn pre(&self, operation: Operation) -> Option<&PreHookFn> {
        match operation {
            Operation::Create => self.pre_create.as_ref(),
            Operation::Update => self.pre_update.as_ref(),
            Operation::Delete => self.pre_delete.as_ref(),
            Operation::List | Operation::Read => None,
        }
    }

    fn post(&self, operation: Operation) -> Option<&PostHookFn> {
        match operation {
            Operation::Create => self.post_create.as_ref(),
            Operation::Update => self.post_update.as_ref(),
            Operation::Delete => self.post_delete.as_ref(),
            Operation::List | Operation::Read => None,
        }
    }

    /// Run the pre hook; without one the body proceeds unchanged
    pub async fn run_pre(&self, operation: Operation, args: PreHookArgs) -> HookOutcome {
        match self.pre(operation) {
            None => HookOutcome::Proceed(args.body),
            Some(hook) => {
                let outcome = classify_pre(operation, hook(args).await);
                if let HookOutcome::Fail(err) = &outcome {
                    if !err.disable_external_error_tracking {
                        tracing::warn!(%operation, title = %err.title, "pre hook failed");
                    }
                }
                outcome
            }
        }
    }

    /// Run the post hook after the mutation committed
    ///
    /// Failures are reported as 400 but nothing is rolled back.
    pub async fn run_post(&self, operation: Operation, args: PostHookArgs) -> ApiResult<()> {
        let Some(hook) = self.post(operation) else {
            return Ok(());
        };
        hook(args).await.map_err(|err| {
            let err = ApiError::from_stage(
                ErrorKind::InvalidRequest,
                format!("post{} hook error", operation.label()),
                err,
            );
            if !err.disable_external_error_tracking {
                tracing::warn!(%operation, title = %err.title, "post hook failed after commit");
            }
            err
        })
    }
}
