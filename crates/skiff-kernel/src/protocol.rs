//! Wire protocol between the kernel manager and the interpreter driver:
//! newline-delimited JSON, requests on the child's stdin, events on its
//! stdout.

use serde::{Deserialize, Serialize};

use crate::outcome::RawStatus;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Request<'a> {
    Execute {
        id: u64,
        code: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        cwd: Option<&'a str>,
    },
    Ping {
        id: u64,
    },
    Shutdown,
}

/// One event emitted by the interpreter driver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KernelEvent {
    /// Readiness handshake, sent exactly once after startup.
    Ready,
    Pong {
        id: u64,
    },
    /// Incremental output produced by the evaluation, in arrival order.
    Stream {
        text: String,
    },
    /// The executed code attempted to read interactive input.
    StdinRequest,
    Result {
        id: u64,
        status: RawStatus,
        #[serde(default)]
        cancelled: bool,
        #[serde(default)]
        error: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_driver_events() {
        let ready: KernelEvent = serde_json::from_str(r#"{"event":"ready"}"#).unwrap();
        assert_eq!(ready, KernelEvent::Ready);

        let stream: KernelEvent =
            serde_json::from_str(r#"{"event":"stream","text":"hello\n"}"#).unwrap();
        assert_eq!(
            stream,
            KernelEvent::Stream {
                text: "hello\n".to_string()
            }
        );

        let stdin: KernelEvent = serde_json::from_str(r#"{"event":"stdin_request"}"#).unwrap();
        assert_eq!(stdin, KernelEvent::StdinRequest);
    }

    #[test]
    fn parses_result_events() {
        let ok: KernelEvent = serde_json::from_str(
            r#"{"event":"result","id":3,"status":"ok","cancelled":false,"error":null}"#,
        )
        .unwrap();
        assert_eq!(
            ok,
            KernelEvent::Result {
                id: 3,
                status: RawStatus::Ok,
                cancelled: false,
                error: None,
            }
        );

        let err: KernelEvent = serde_json::from_str(
            r#"{"event":"result","id":4,"status":"error","cancelled":true,"error":"KeyboardInterrupt"}"#,
        )
        .unwrap();
        assert_eq!(
            err,
            KernelEvent::Result {
                id: 4,
                status: RawStatus::Error,
                cancelled: true,
                error: Some("KeyboardInterrupt".to_string()),
            }
        );
    }

    #[test]
    fn serializes_requests() {
        let execute = serde_json::to_string(&Request::Execute {
            id: 1,
            code: "print(1)",
            cwd: None,
        })
        .unwrap();
        assert_eq!(execute, r#"{"op":"execute","id":1,"code":"print(1)"}"#);

        let with_cwd = serde_json::to_string(&Request::Execute {
            id: 2,
            code: "pass",
            cwd: Some("/tmp"),
        })
        .unwrap();
        assert_eq!(
            with_cwd,
            r#"{"op":"execute","id":2,"code":"pass","cwd":"/tmp"}"#
        );

        let shutdown = serde_json::to_string(&Request::Shutdown).unwrap();
        assert_eq!(shutdown, r#"{"op":"shutdown"}"#);
    }
}
