//! Response classification and decoding.

use serde::de::DeserializeOwned;

use crate::error::{ClientError, ErrorBody};
use crate::http::HttpResponse;

/// Map a response status onto the outcome taxonomy.
///
/// Returns `Ok(())` for 2xx so the caller can decode the body. 401 is checked
/// before the rest of the failure band because it drives the refresh-and-retry
/// path in the executor.
pub fn check_status(response: &HttpResponse) -> Result<(), ClientError> {
    match response.status {
        200..=299 => Ok(()),
        401 => Err(ClientError::Unauthorized),
        400..=599 => match serde_json::from_slice::<ErrorBody>(&response.body) {
            Ok(body) => Err(ClientError::Api {
                domain_code: body.domain_code(),
                message: body.message,
                status: response.status,
            }),
            Err(_) => Err(ClientError::InvalidErrorBody),
        },
        status => Err(ClientError::Unknown { status }),
    }
}

/// Classify `response` and decode its body as JSON into `T`.
pub fn decode_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ClientError> {
    check_status(response)?;
    serde_json::from_slice(&response.body).map_err(ClientError::Serialization)
}

/// Classify `response` and discard its body.
pub fn decode_empty(response: &HttpResponse) -> Result<(), ClientError> {
    check_status(response)
}
