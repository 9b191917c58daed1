//! Bounded retry of transient storage failures.
//!
//! An operation reports each attempt as an [`Attempt`]; between attempts a
//! recovery step may refresh connections, hand the next attempt a fresh input,
//! or decide that retrying is moot because the situation has already been
//! resolved elsewhere.

use std::future::Future;

use crate::core::QueueError;

/// Retries the completion engine may spend per transition.
pub const RETRY_BUDGET: u32 = 1;

/// Outcome of one attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    /// Succeeded.
    Done(T),
    /// Failed in a way another attempt may fix.
    Retryable(QueueError),
    /// Failed for good.
    Fatal(QueueError),
}

impl<T> From<Result<T, QueueError>> for Attempt<T> {
    fn from(result: Result<T, QueueError>) -> Self {
        match result {
            Ok(value) => Self::Done(value),
            Err(err) if err.is_transient() => Self::Retryable(err),
            Err(err) => Self::Fatal(err),
        }
    }
}

/// Decision of the recovery step between attempts.
#[derive(Debug)]
pub enum Recovery<I, S> {
    /// Run the operation again on this input.
    Retry(I),
    /// Stop; the situation resolved itself with this value.
    Resolved(S),
}

/// Final result of [`with_bounded_retry`].
#[derive(Debug, PartialEq, Eq)]
pub enum Retried<T, S> {
    /// The operation succeeded, possibly after retries.
    Done(T),
    /// Recovery short-circuited with a resolution.
    Resolved(S),
}

/// Run `op` and retry transient failures at most `budget` times.
///
/// `op` receives its input and the zero-based attempt number; the first
/// attempt gets `input`. Before each retry `recover` gets the error and the
/// upcoming attempt number, and supplies the input for that attempt.
///
/// # Errors
///
/// Fatal errors propagate immediately. A transient error after the budget is
/// spent propagates as is. Errors from `recover` propagate.
pub async fn with_bounded_retry<I, T, S, Op, OpFut, Rec, RecFut>(
    budget: u32,
    input: I,
    mut op: Op,
    mut recover: Rec,
) -> Result<Retried<T, S>, QueueError>
where
    Op: FnMut(I, u32) -> OpFut,
    OpFut: Future<Output = Attempt<T>>,
    Rec: FnMut(QueueError, u32) -> RecFut,
    RecFut: Future<Output = Result<Recovery<I, S>, QueueError>>,
{
    let mut attempt = 0;
    let mut input = input;
    loop {
        match op(input, attempt).await {
            Attempt::Done(value) => return Ok(Retried::Done(value)),
            Attempt::Fatal(err) => return Err(err),
            Attempt::Retryable(err) if attempt >= budget => return Err(err),
            Attempt::Retryable(err) => {
                attempt += 1;
                match recover(err, attempt).await? {
                    Recovery::Retry(fresh) => input = fresh,
                    Recovery::Resolved(value) => return Ok(Retried::Resolved(value)),
                }
            }
        }
    }
}
