//! Assertion helpers for engine results

use crate::core_delivery::DeliveryStatus;
use crate::core_engine::MessageEngine;
use crate::core_model::{MessageId, UserId};
use crate::errors::EngineError;
use std::fmt::Debug;

/// Assert that a Result is Ok and return the value
pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a Result is Err and return the error
pub fn assert_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
        Err(e) => e,
    }
}

/// Assert that an engine call failed with the given HTTP-style status
pub fn assert_status_code<T: Debug>(result: Result<T, EngineError>, expected: u16) -> EngineError {
    let err = assert_err(result);
    assert_eq!(
        err.status_code(),
        expected,
        "expected status {}, got {} ({})",
        expected,
        err.status_code(),
        err
    );
    err
}

/// Assert the delivery status of one recipient
pub async fn assert_delivery(
    engine: &MessageEngine,
    message_id: &MessageId,
    recipient: &UserId,
    expected: DeliveryStatus,
) {
    let record = engine
        .delivery_record(message_id, recipient)
        .await
        .unwrap_or_else(|e| panic!("reading {}/{} failed: {}", message_id, recipient, e))
        .unwrap_or_else(|| panic!("no delivery record for {}/{}", message_id, recipient));
    assert_eq!(
        record.status, expected,
        "{}/{} is {}, expected {}",
        message_id, recipient, record.status, expected
    );
}
