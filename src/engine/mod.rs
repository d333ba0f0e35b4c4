//! Engine bridge - the single channel to the external signing engine.
//!
//! Every operation travels as one `{"method", "context", "args"}` envelope
//! and comes back as either a method-specific success payload or a
//! `{"error": "..."}` value. The call convention is a string-in/string-out
//! [`Transport`]; anything satisfying it (dynamic library, subprocess, test
//! double) is a valid engine.
//!
//! A well-formed error payload becomes [`Error::Domain`]. Only an
//! unparsable response (or an unreachable engine) is escalated as
//! [`Error::TransportMalformed`]. Calls are synchronous and never retried.

pub mod local;
pub mod subprocess;

use crate::config::EngineContext;
use crate::network::Network;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

pub use local::LocalEngine;
pub use subprocess::SubprocessTransport;

pub trait Transport: Send + Sync {
    /// One request envelope in, one response out, both JSON text.
    fn call(&self, request: &str) -> Result<String>;
}

pub struct EngineBridge {
    transport: Box<dyn Transport>,
    context: EngineContext,
}

impl EngineBridge {
    pub fn new(transport: impl Transport + 'static, context: EngineContext) -> Self {
        EngineBridge { transport: Box::new(transport), context }
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    pub fn network(&self) -> Network {
        self.context.network
    }

    pub fn invoke(&self, method: &str, args: Value) -> Result<Value> {
        let request = json!({
            "method": method,
            "context": self.context,
            "args": args,
        });
        let request = serde_json::to_string(&request)
            .map_err(|e| Error::TransportMalformed(format!("request encode: {}", e)))?;
        info!(method, network = %self.context.network, "engine call");

        let raw = self.transport.call(&request)?;
        debug!(method, response_len = raw.len(), "engine response");

        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| Error::TransportMalformed(format!("response decode: {}", e)))?;
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Err(Error::Domain(error.to_string()));
        }
        Ok(value)
    }

    /// `invoke` with typed arguments and a typed response. A response that
    /// does not fit the method's shape is a broken contract, not a domain
    /// error.
    pub fn invoke_as<A: Serialize, T: DeserializeOwned>(&self, method: &str, args: &A) -> Result<T> {
        let args = serde_json::to_value(args)
            .map_err(|e| Error::TransportMalformed(format!("args encode: {}", e)))?;
        let value = self.invoke(method, args)?;
        serde_json::from_value(value)
            .map_err(|e| Error::TransportMalformed(format!("{} response shape: {}", method, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;

    /// Answers every call with a canned response, capturing the request.
    struct Canned {
        response: String,
        last: std::sync::Mutex<Option<String>>,
    }

    impl Canned {
        fn new(response: &str) -> Self {
            Canned { response: response.into(), last: std::sync::Mutex::new(None) }
        }
    }

    impl Transport for Canned {
        fn call(&self, request: &str) -> Result<String> {
            *self.last.lock().unwrap() = Some(request.to_string());
            Ok(self.response.clone())
        }
    }

    fn bridge(response: &str) -> EngineBridge {
        let context = EngineContext::new(Network::Regtest).with_datadir("/tmp/cs");
        EngineBridge::new(Canned::new(response), context)
    }

    #[test]
    fn envelope_carries_method_context_args() {
        let transport = Canned::new("{}");
        let captured = std::sync::Arc::new(transport);
        let context = EngineContext::new(Network::Signet).with_datadir("/d");
        let bridge = EngineBridge::new(ArcTransport(captured.clone()), context);
        bridge.invoke("list", serde_json::json!({"kind": "Key"})).unwrap();

        let sent: Value =
            serde_json::from_str(captured.last.lock().unwrap().as_deref().unwrap()).unwrap();
        assert_eq!(sent["method"], "list");
        assert_eq!(sent["context"]["network"], "signet");
        assert_eq!(sent["context"]["datadir"], "/d");
        assert_eq!(sent["args"]["kind"], "Key");
    }

    struct ArcTransport(std::sync::Arc<Canned>);
    impl Transport for ArcTransport {
        fn call(&self, request: &str) -> Result<String> {
            self.0.call(request)
        }
    }

    #[test]
    fn error_payload_becomes_domain_error() {
        let bridge = bridge(r#"{"error": "Incompatible networks"}"#);
        match bridge.invoke("restore", Value::Null) {
            Err(Error::Domain(msg)) => assert_eq!(msg, "Incompatible networks"),
            other => panic!("expected domain error, got {:?}", other),
        }
    }

    #[test]
    fn garbage_response_is_transport_malformed() {
        let bridge = bridge("not json at all");
        assert!(matches!(
            bridge.invoke("list", Value::Null),
            Err(Error::TransportMalformed(_))
        ));
    }

    #[test]
    fn shape_mismatch_is_transport_malformed() {
        let bridge = bridge(r#"{"unexpected": true}"#);
        let result: Result<crate::store::records::ListOutput> =
            bridge.invoke_as("list", &serde_json::json!({}));
        assert!(matches!(result, Err(Error::TransportMalformed(_))));
    }
}
