use std::any::Any;
use wirebridge_common::context::Context;
use wirebridge_common::protocol::error::BridgeError;
use wirebridge_common::protocol::{Envelope, Status};

/// Turns a failed call into the envelope sent back to the caller.
pub trait ErrorEncoder: Send + Sync {
    fn encode(&self, ctx: &Context, err: &BridgeError) -> Envelope;
}

impl<F> ErrorEncoder for F
where
    F: Fn(&Context, &BridgeError) -> Envelope + Send + Sync,
{
    fn encode(&self, ctx: &Context, err: &BridgeError) -> Envelope {
        self(ctx, err)
    }
}

/// Structured status of the error plus the call's reply headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorEncoder;

impl ErrorEncoder for DefaultErrorEncoder {
    fn encode(&self, ctx: &Context, err: &BridgeError) -> Envelope {
        let headers = ctx
            .transport()
            .map(|t| t.reply_header().to_map())
            .unwrap_or_default();
        Envelope::from_status(Status::from_error(err), headers)
    }
}

/// Converts a panic caught at the dispatch boundary into an error.
pub trait Recovery: Send + Sync {
    fn recover(&self, ctx: &Context, panic: &(dyn Any + Send)) -> BridgeError;
}

impl<F> Recovery for F
where
    F: Fn(&Context, &(dyn Any + Send)) -> BridgeError + Send + Sync,
{
    fn recover(&self, ctx: &Context, panic: &(dyn Any + Send)) -> BridgeError {
        self(ctx, panic)
    }
}

pub const PANIC_REASON: &str = "PANIC_RECOVERED";

/// Reports the panic as an internal status carrying the panic message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRecovery;

impl Recovery for DefaultRecovery {
    fn recover(&self, _ctx: &Context, panic: &(dyn Any + Send)) -> BridgeError {
        BridgeError::Status(Status::internal(PANIC_REASON, panic_message(panic)))
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wirebridge_common::protocol::{Header, HeaderCarrier};
    use wirebridge_common::transport::Transport;

    #[test]
    fn test_default_encoder_keeps_status() {
        let err = BridgeError::Status(Status::new(429, "RATE_LIMITED", "slow down"));
        let envelope = DefaultErrorEncoder.encode(&Context::background(), &err);

        assert!(envelope.payload.is_none());
        assert_eq!(envelope.error.unwrap().reason, "RATE_LIMITED");
    }

    #[test]
    fn test_default_encoder_wraps_other_errors() {
        let err = BridgeError::Codec("bad bytes".into());
        let status = DefaultErrorEncoder
            .encode(&Context::background(), &err)
            .error
            .unwrap();
        assert_eq!(status.code, 500);
        assert!(status.message.contains("bad bytes"));
    }

    #[test]
    fn test_default_encoder_attaches_reply_headers() {
        let transport = Arc::new(Transport::server("tcp://127.0.0.1:9090", HeaderCarrier::new()));
        transport.reply_header().set("x-region", "eu");
        let ctx = Context::background().with_transport(transport);

        let envelope = DefaultErrorEncoder.encode(&ctx, &BridgeError::Canceled);
        assert_eq!(envelope.headers.get("x-region"), Some(&vec!["eu".to_string()]));
    }

    #[test]
    fn test_closure_encoder() {
        let encoder = |_ctx: &Context, _err: &BridgeError| Envelope::new();
        assert_eq!(
            encoder.encode(&Context::background(), &BridgeError::Canceled),
            Envelope::new()
        );
    }

    #[test]
    fn test_panic_message() {
        let caught = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "boom");

        let caught = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "code 7");

        let caught = std::panic::catch_unwind(|| std::panic::panic_any(3u8)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "unknown panic");
    }

    #[test]
    fn test_default_recovery() {
        let err = DefaultRecovery.recover(&Context::background(), &"kaput");
        let status = err.as_status().unwrap();
        assert_eq!(status.code, 500);
        assert_eq!(status.reason, PANIC_REASON);
        assert_eq!(status.message, "kaput");
    }
}
