use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SqlFluentError;

/// Cancellation and deadline carrier passed to every blocking entry point.
///
/// The builder and sessions hand the context to the backend untouched; backends race their
/// work against it with [`Context::run`] or [`Context::run_or_abort`].
///
/// ```rust
/// use std::time::Duration;
/// use sql_fluent::prelude::*;
///
/// let cx = Context::background().with_timeout(Duration::from_secs(5));
/// assert!(cx.deadline().is_some());
/// assert!(!cx.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A child context that also expires after `timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A child context that expires at `deadline`, or earlier if the parent does.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// A child that is cancelled along with this context but can be cancelled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already done.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` or `DeadlineExceeded`.
    pub fn check(&self) -> Result<(), SqlFluentError> {
        if self.token.is_cancelled() {
            return Err(SqlFluentError::Cancelled);
        }
        if self.deadline.is_some_and(|at| at <= Instant::now()) {
            return Err(SqlFluentError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` until it completes or the context ends.
    ///
    /// # Errors
    ///
    /// Returns the future's error, or `Cancelled` / `DeadlineExceeded`.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, SqlFluentError>
    where
        F: Future<Output = Result<T, SqlFluentError>>,
    {
        self.run_or_abort(fut, || {}).await
    }

    /// Like [`Context::run`], calling `on_abort` before giving up on `fut`.
    ///
    /// Backends use `on_abort` to interrupt work that keeps running on another thread.
    ///
    /// # Errors
    ///
    /// Returns the future's error, or `Cancelled` / `DeadlineExceeded`.
    pub async fn run_or_abort<T, F, A>(&self, fut: F, on_abort: A) -> Result<T, SqlFluentError>
    where
        F: Future<Output = Result<T, SqlFluentError>>,
        A: FnOnce(),
    {
        self.check()?;
        let raced = match self.deadline {
            Some(at) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Err(SqlFluentError::Cancelled),
                    () = tokio::time::sleep_until(at) => Err(SqlFluentError::DeadlineExceeded),
                    res = fut => Ok(res),
                }
            }
            None => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Err(SqlFluentError::Cancelled),
                    res = fut => Ok(res),
                }
            }
        };
        match raced {
            Ok(res) => res,
            Err(err) => {
                on_abort();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let cx = Context::background();
        let v = cx.run(async { Ok::<_, SqlFluentError>(7) }).await.unwrap();
        assert_eq!(v, 7);
    }

    #[tokio::test]
    async fn cancelled_parent_cancels_child() {
        let parent = Context::background();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
        let err = child
            .run(async { Ok::<_, SqlFluentError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, SqlFluentError::Cancelled));
    }

    #[tokio::test]
    async fn deadline_interrupts_slow_work() {
        let cx = Context::background().with_timeout(Duration::from_millis(20));
        let mut aborted = false;
        let err = cx
            .run_or_abort(
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, SqlFluentError>(())
                },
                || aborted = true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SqlFluentError::DeadlineExceeded));
        assert!(aborted);
    }

    #[test]
    fn child_deadline_never_outlives_parent() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let parent = Context::background().with_timeout(Duration::from_secs(1));
            let child = parent.with_timeout(Duration::from_secs(60));
            assert_eq!(child.deadline(), parent.deadline());
        });
    }
}
