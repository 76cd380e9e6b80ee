//! Interceptor composition.
//!
//! Requests and replies flow through interceptors as type-erased
//! [`Message`]s, so one interceptor can wrap calls of any request type. The
//! typed edges (client call, server route) box the concrete value on the way
//! in and [`into_reply`] unboxes it on the way out.

use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::protocol::error::{BridgeError, Result};
use crate::protocol::Status;

pub type Message = Box<dyn Any + Send>;

pub type Handler = Arc<dyn Fn(Context, Message) -> BoxFuture<'static, Result<Message>> + Send + Sync>;

pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Context, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Message>> + Send + 'static,
{
    Arc::new(move |ctx, msg| Box::pin(f(ctx, msg)))
}

pub fn middleware_fn<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wraps `handler` so that `middleware[0]` runs first and the handler last.
pub fn chain(middleware: &[Middleware], handler: Handler) -> Handler {
    middleware
        .iter()
        .rev()
        .fold(handler, |next, m| m(next))
}

/// Unboxes a reply produced by a handler chain.
///
/// Accepts `Option<T>`, a bare `T`, or `()` (no body, `None`).
pub fn into_reply<T: Any>(msg: Message) -> Result<Option<T>> {
    let msg = match msg.downcast::<Option<T>>() {
        Ok(reply) => return Ok(*reply),
        Err(msg) => msg,
    };
    let msg = match msg.downcast::<T>() {
        Ok(reply) => return Ok(Some(*reply)),
        Err(msg) => msg,
    };
    if msg.is::<()>() {
        return Ok(None);
    }
    Err(BridgeError::Codec(format!(
        "unexpected reply type, wanted {}",
        std::any::type_name::<T>()
    )))
}

/// Returns the structured form of an error-shaped message.
///
/// A message is error-shaped when it holds a [`Status`] or a [`BridgeError`];
/// such a value is sent as the envelope's error instead of being encoded as a
/// payload.
pub fn as_error(msg: &Message) -> Option<Status> {
    if let Some(status) = msg.downcast_ref::<Status>() {
        return Some(status.clone());
    }
    msg.downcast_ref::<BridgeError>().map(Status::from_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Middleware {
        middleware_fn(move |next: Handler| {
            let log = log.clone();
            handler_fn(move |ctx, msg| {
                let next = next.clone();
                let log = log.clone();
                async move {
                    log.lock().push(format!("{name}:before"));
                    let reply = next(ctx, msg).await;
                    log.lock().push(format!("{name}:after"));
                    reply
                }
            })
        })
    }

    fn echo() -> Handler {
        handler_fn(|_ctx, msg| async move { Ok(msg) })
    }

    #[tokio::test]
    async fn test_chain_runs_in_configured_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = chain(
            &[recording("a", log.clone()), recording("b", log.clone())],
            echo(),
        );

        let reply = handler(Context::background(), Box::new(7u32)).await.unwrap();
        assert_eq!(into_reply::<u32>(reply).unwrap(), Some(7));
        assert_eq!(
            *log.lock(),
            vec!["a:before", "b:before", "b:after", "a:after"]
        );
    }

    #[tokio::test]
    async fn test_empty_chain_is_the_handler() {
        let handler = chain(&[], echo());
        let reply = handler(Context::background(), Box::new("hi".to_string()))
            .await
            .unwrap();
        assert_eq!(into_reply::<String>(reply).unwrap(), Some("hi".to_string()));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let deny = middleware_fn(|_next: Handler| {
            handler_fn(|_ctx, _msg| async move {
                Err(BridgeError::Status(Status::new(403, "DENIED", "nope")))
            })
        });
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();
        let handler = chain(
            &[deny],
            handler_fn(move |_ctx, msg| {
                *flag.lock() = true;
                async move { Ok(msg) }
            }),
        );

        let err = handler(Context::background(), Box::new(())).await.unwrap_err();
        assert_eq!(err.as_status().unwrap().code, 403);
        assert!(!*called.lock());
    }

    #[test]
    fn test_into_reply_variants() {
        assert_eq!(into_reply::<u8>(Box::new(Some(1u8))).unwrap(), Some(1));
        assert_eq!(into_reply::<u8>(Box::new(None::<u8>)).unwrap(), None);
        assert_eq!(into_reply::<u8>(Box::new(())).unwrap(), None);
        assert!(into_reply::<u8>(Box::new("wrong")).unwrap_err().is_codec());
    }

    #[test]
    fn test_as_error() {
        let status: Message = Box::new(Status::new(400, "BAD", "bad"));
        assert_eq!(as_error(&status).unwrap().code, 400);

        let err: Message = Box::new(BridgeError::Resolve("none".into()));
        assert_eq!(as_error(&err).unwrap().code, 500);

        let plain: Message = Box::new(5i32);
        assert!(as_error(&plain).is_none());
    }
}
