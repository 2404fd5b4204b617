// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Request and response frames exchanged between inspector and device.
// Author: Lukas Bower

//! Request/response frames.
//!
//! On the TCP line transport every frame is one JSON object terminated by a
//! newline. Responses echo the request tag.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{NamespaceIndex, NodeClass, NodeRef, ServiceError, Value};

/// Request envelope containing a tag and message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Request identifier, echoed back by the response.
    pub tag: u32,
    /// The concrete request payload.
    pub body: RequestBody,
}

/// Response envelope containing a tag and message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Mirrors the request tag.
    pub tag: u32,
    /// The concrete response payload.
    pub body: ResponseBody,
}

/// Operations served by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RequestBody {
    /// List registered namespace URIs in index order.
    NamespaceArray,
    /// Resolve a namespace URI to its index.
    ResolveNamespace {
        /// Namespace URI.
        uri: String,
    },
    /// Enumerate the ordered children of a node.
    BrowseChildren {
        /// Parent node.
        node: NodeRef,
    },
    /// Read the browse name attribute.
    ReadBrowseName {
        /// Target node.
        node: NodeRef,
    },
    /// Read the node class attribute.
    ReadNodeClass {
        /// Target node.
        node: NodeRef,
    },
    /// Read a variable value.
    ReadValue {
        /// Target variable.
        node: NodeRef,
    },
    /// Write a variable value through the external path.
    WriteValue {
        /// Target variable.
        node: NodeRef,
        /// Value to store.
        value: Value,
    },
}

/// Replies produced by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Reply to [`RequestBody::NamespaceArray`].
    NamespaceArray {
        /// URIs in index order.
        uris: Vec<String>,
    },
    /// Reply to [`RequestBody::ResolveNamespace`].
    ResolveNamespace {
        /// Resolved index.
        index: NamespaceIndex,
    },
    /// Reply to [`RequestBody::BrowseChildren`].
    BrowseChildren {
        /// Children in insertion order.
        children: Vec<NodeRef>,
    },
    /// Reply to [`RequestBody::ReadBrowseName`].
    ReadBrowseName {
        /// Browse name of the node.
        name: String,
    },
    /// Reply to [`RequestBody::ReadNodeClass`].
    ReadNodeClass {
        /// Class of the node.
        class: NodeClass,
    },
    /// Reply to [`RequestBody::ReadValue`].
    ReadValue {
        /// Current value.
        value: Value,
    },
    /// Reply to [`RequestBody::WriteValue`].
    WriteValue,
    /// The request failed on the device.
    Error {
        /// Service failure.
        error: ServiceError,
    },
}

/// Failure to encode or decode a frame line.
#[derive(Debug, Error)]
pub enum FrameError {
    /// JSON encoding or decoding failed.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a frame as a single JSON line (without the trailing newline).
pub fn encode_line<T: Serialize>(frame: &T) -> Result<String, FrameError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode a frame from a single JSON line.
pub fn decode_line<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T, FrameError> {
    Ok(serde_json::from_str(line.trim_end_matches(['\r', '\n']))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_names_the_operation() {
        let request = Request {
            tag: 7,
            body: RequestBody::BrowseChildren {
                node: NodeRef::objects_folder(),
            },
        };
        let line = encode_line(&request).expect("encode");
        assert_eq!(
            line,
            r#"{"tag":7,"body":{"op":"browse_children","node":"ns=0;i=85"}}"#
        );
        let decoded: Request = decode_line(&line).expect("decode");
        assert_eq!(decoded, request);
    }

    #[test]
    fn error_response_carries_service_error() {
        let response = Response {
            tag: 3,
            body: ResponseBody::Error {
                error: ServiceError::NotWritable(NodeRef::numeric(2, 5)),
            },
        };
        let line = encode_line(&response).expect("encode");
        let decoded: Response = decode_line(&format!("{line}\n")).expect("decode");
        assert_eq!(decoded, response);
    }

    #[test]
    fn non_finite_write_cannot_be_encoded() {
        let request = Request {
            tag: 1,
            body: RequestBody::WriteValue {
                node: NodeRef::numeric(2, 2),
                value: Value::Float(f64::NAN),
            },
        };
        assert!(matches!(encode_line(&request), Err(FrameError::Json(_))));
    }

    #[test]
    fn garbage_is_a_frame_error() {
        assert!(decode_line::<Response>("{not json").is_err());
    }
}
