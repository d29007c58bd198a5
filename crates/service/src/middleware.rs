use std::net::SocketAddr;

use crate::error::Error;

/// Common shape every dispatched GTPv2-C message handler conforms to:
/// `fn(peer, message) -> Result<Response, Error>`. Middleware wraps an
/// inner handler and composes over this same trait, a function-
/// composition decorator: `Logger::new(ty, handler)`.
pub trait MessageHandler<Req, Resp> {
    fn handle(&self, peer: SocketAddr, message: &Req) -> Result<Resp, Error>;
}

/// Emits a structured info record before delegating to the inner handler.
pub struct Logger<H> {
    message_type: &'static str,
    inner: H,
}

impl<H> Logger<H> {
    pub fn new(message_type: &'static str, inner: H) -> Self {
        Self { message_type, inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<Req, Resp, H> MessageHandler<Req, Resp> for Logger<H>
where
    H: MessageHandler<Req, Resp>,
{
    fn handle(&self, peer: SocketAddr, message: &Req) -> Result<Resp, Error> {
        log::info!(
            "message_type={} source={peer}",
            self.message_type
        );

        self.inner.handle(peer, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOk;

    impl MessageHandler<(), ()> for AlwaysOk {
        fn handle(&self, _peer: SocketAddr, _message: &()) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn logger_delegates_to_the_inner_handler() {
        let handler = Logger::new("Test", AlwaysOk);
        assert!(handler.handle("127.0.0.1:2123".parse().unwrap(), &()).is_ok());
    }
}
