//! # Exception Bridge
//!
//! Converts native errors into `ExceptionEnvelope`s on the executing side and
//! reconstructs native errors from envelopes on the calling side.
//!
//! ## Invariants
//! - Business exceptions keep code, message and properties byte for byte.
//! - Every reconstructed error keeps the service and implementation that
//!   produced it.
//! - Whether a failure is a business exception is read from the envelope's
//!   kind, never guessed from its code.
//! - A remote timeout or unreachable downstream is not a transport failure
//!   of this call: the remote answered. The one exception is a draining
//!   fitable, which tells the caller to try another target.

use fitrpc::code;
use fitrpc::ExceptionEnvelope;
use fitrpc::ExceptionKind;

use crate::error::BusinessError;
use crate::error::Error;
use crate::error::Origin;

/// Encodes `error` for the wire, attributing it to `origin` unless the error
/// already carries the origin of a deeper remote call.
pub fn to_envelope(error: &Error, origin: &Origin) -> ExceptionEnvelope {
    let origin = error.origin().unwrap_or(origin);
    let envelope = |code: i32, message: String| {
        ExceptionEnvelope::system(origin.service_id.clone(), origin.impl_id.clone(), code, message)
    };

    match error {
        Error::Business(e) => {
            ExceptionEnvelope::business(origin.service_id.clone(), origin.impl_id.clone(), e.code, e.message.clone())
                .with_properties(e.properties.clone())
        }
        Error::Unavailable { fitable, .. } => envelope(code::UNAVAILABLE, fitable.clone()),
        Error::NotFound { what, .. } => envelope(code::NOT_FOUND, what.clone()),
        Error::NoRouteAvailable { service, .. } => envelope(code::NO_ROUTE, service.clone()),
        Error::Rejected { message, .. } => envelope(code::REJECTED, message.clone()),
        Error::Unreachable { .. } | Error::AllTargetsUnreachable { .. } => {
            envelope(code::UNREACHABLE, error.to_string())
        }
        Error::Timeout { .. } => envelope(code::TIMEOUT, error.to_string()),
        Error::NoCompatibleFormat { .. } => envelope(code::NO_COMPATIBLE_FORMAT, error.to_string()),
        Error::Cancelled => envelope(code::CANCELLED, error.to_string()),
        Error::Rpc(_) | Error::Identity(_) => envelope(code::PROTOCOL_VIOLATION, error.to_string()),
        Error::Remote(inner) => inner.clone(),
        _ => envelope(code::INTERNAL, error.to_string()),
    }
}

/// Reconstructs the native error an envelope describes.
pub fn from_envelope(envelope: ExceptionEnvelope) -> Error {
    let origin = Some(Origin::new(envelope.service_id.clone(), envelope.impl_id.clone()));

    if envelope.kind == ExceptionKind::Business {
        return Error::Business(BusinessError {
            code: envelope.code,
            message: envelope.message,
            properties: envelope.properties,
            origin,
        });
    }

    match envelope.code {
        code::NOT_FOUND => Error::NotFound { what: envelope.message, origin },
        code::UNAVAILABLE => Error::Unavailable { fitable: envelope.message, origin },
        code::NO_ROUTE => Error::NoRouteAvailable { service: envelope.message, origin },
        code::REJECTED => Error::Rejected { message: envelope.message, origin },
        _ => Error::Remote(envelope),
    }
}

impl From<ExceptionEnvelope> for Error {
    fn from(envelope: ExceptionEnvelope) -> Self {
        from_envelope(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Origin {
        Origin::new("pay.charge@1.0.0", "card@2")
    }

    #[test]
    fn test_business_exception_keeps_every_field() {
        let raised = Error::Business(BusinessError::new(4001, "bad arg").with_property("field", "x"));
        let envelope = to_envelope(&raised, &origin());

        assert_eq!(envelope.code, 4001);
        assert_eq!(envelope.service_id, "pay.charge@1.0.0");
        assert_eq!(envelope.impl_id, "card@2");

        let Error::Business(rebuilt) = from_envelope(envelope) else {
            panic!("Expected a business exception");
        };
        assert_eq!(rebuilt.code, 4001);
        assert_eq!(rebuilt.message, "bad arg");
        assert_eq!(rebuilt.property("field"), Some("x"));
        assert_eq!(rebuilt.origin, Some(origin()));
    }

    #[test]
    fn test_nested_origin_is_preserved() {
        let deeper = Origin::new("ledger.post@2", "pg@1");
        let mut business = BusinessError::new(17, "overdrawn");
        business.origin = Some(deeper.clone());

        let envelope = to_envelope(&Error::Business(business), &origin());
        assert_eq!(envelope.service_id, deeper.service_id);
        assert_eq!(envelope.impl_id, deeper.impl_id);
    }

    #[test]
    fn test_system_codes_map_back_to_taxonomy() {
        let not_found = to_envelope(&Error::not_found("executor"), &origin());
        let rebuilt = from_envelope(not_found);
        assert!(rebuilt.is_not_found());
        assert_eq!(rebuilt.origin(), Some(&origin()));

        let rejected = from_envelope(to_envelope(&Error::rejected("no token"), &origin()));
        assert!(matches!(rejected, Error::Rejected { ref message, .. } if message == "no token"));
    }

    #[test]
    fn test_remote_transport_codes_are_not_transport_errors() {
        let envelope = to_envelope(&Error::timeout("downstream"), &origin());
        assert_eq!(envelope.code, code::TIMEOUT);

        let rebuilt = from_envelope(envelope);
        assert!(!rebuilt.is_transport());
        assert!(matches!(rebuilt, Error::Remote(_)));
    }

    #[test]
    fn test_business_kind_wins_over_code() {
        for raised_code in [code::OK, code::UNREACHABLE, code::NOT_FOUND] {
            let raised = Error::Business(BusinessError::new(raised_code, "boom"));
            let envelope = to_envelope(&raised, &origin());
            assert_eq!(envelope.kind, ExceptionKind::Business);

            let rebuilt = from_envelope(envelope);
            assert!(rebuilt.is_business(), "code {} came back as {}", raised_code, rebuilt);
            let Error::Business(e) = rebuilt else { unreachable!() };
            assert_eq!(e.code, raised_code);
        }
    }

    #[test]
    fn test_draining_fitable_is_transport_class() {
        let draining = Error::Unavailable { fitable: "pay.charge@1.0.0#card@1".into(), origin: None };
        let envelope = to_envelope(&draining, &origin());
        assert_eq!(envelope.code, code::UNAVAILABLE);
        assert!(envelope.is_system());

        let rebuilt = from_envelope(envelope);
        assert!(rebuilt.is_transport());
        assert_eq!(rebuilt.origin(), Some(&origin()));
    }
}
