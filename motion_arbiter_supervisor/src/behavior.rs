//! Request/response clients for the MRM behavior services.
//!
//! Every call is bounded by a wait; an unanswered call is an error the
//! handler retries on a later tick.

use std::collections::HashMap;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use motion_arbiter_core::MrmBehavior;

/// `operate: true` activates, `false` cancels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperateMrmRequest {
    pub operate: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperateMrmResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{service} service did not answer within {waited:?}")]
    Timeout { service: MrmBehavior, waited: Duration },
    #[error("{service} service is not connected")]
    Disconnected { service: MrmBehavior },
}

pub trait MrmBehaviorClient: Send {
    fn operate(
        &mut self,
        behavior: MrmBehavior,
        request: OperateMrmRequest,
        wait: Duration,
    ) -> Result<OperateMrmResponse, ServiceError>;
}

/// One request as seen by the serving side. Answer on `reply`.
#[derive(Debug)]
pub struct ServiceCall {
    pub request: OperateMrmRequest,
    pub reply: Sender<OperateMrmResponse>,
}

impl ServiceCall {
    /// Send the response; a caller that stopped waiting is ignored.
    pub fn respond(self, success: bool) {
        let _ = self.reply.send(OperateMrmResponse { success });
    }
}

/// Client over in-process channels, one endpoint per behavior.
#[derive(Debug, Default)]
pub struct ChannelBehaviorClient {
    endpoints: HashMap<MrmBehavior, Sender<ServiceCall>>,
}

impl ChannelBehaviorClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the service for `behavior` and hand back its request queue.
    pub fn connect(&mut self, behavior: MrmBehavior) -> Receiver<ServiceCall> {
        let (tx, rx) = unbounded();
        self.endpoints.insert(behavior, tx);
        rx
    }
}

impl MrmBehaviorClient for ChannelBehaviorClient {
    fn operate(
        &mut self,
        behavior: MrmBehavior,
        request: OperateMrmRequest,
        wait: Duration,
    ) -> Result<OperateMrmResponse, ServiceError> {
        let disconnected = ServiceError::Disconnected { service: behavior };
        let endpoint = self.endpoints.get(&behavior).ok_or_else(|| disconnected.clone())?;

        let (reply_tx, reply_rx) = bounded(1);
        endpoint
            .send(ServiceCall {
                request,
                reply: reply_tx,
            })
            .map_err(|_| disconnected.clone())?;

        match reply_rx.recv_timeout(wait) {
            Ok(resp) => Ok(resp),
            Err(RecvTimeoutError::Timeout) => Err(ServiceError::Timeout {
                service: behavior,
                waited: wait,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answered_call_round_trips() {
        let mut client = ChannelBehaviorClient::new();
        let rx = client.connect(MrmBehavior::EmergencyStop);
        let server = std::thread::spawn(move || {
            let call = rx.recv().expect("request");
            assert!(call.request.operate);
            call.respond(true);
        });

        let resp = client
            .operate(
                MrmBehavior::EmergencyStop,
                OperateMrmRequest { operate: true },
                Duration::from_secs(5),
            )
            .expect("response");
        assert!(resp.success);
        server.join().expect("server thread");
    }

    #[test]
    fn silent_service_times_out() {
        let mut client = ChannelBehaviorClient::new();
        let _rx = client.connect(MrmBehavior::ComfortableStop);
        let err = client
            .operate(
                MrmBehavior::ComfortableStop,
                OperateMrmRequest { operate: false },
                Duration::from_millis(10),
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Timeout { .. }));
    }

    #[test]
    fn unknown_service_is_disconnected() {
        let mut client = ChannelBehaviorClient::new();
        let err = client
            .operate(
                MrmBehavior::EmergencyStop,
                OperateMrmRequest { operate: true },
                Duration::from_millis(10),
            )
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Disconnected {
                service: MrmBehavior::EmergencyStop
            }
        );
    }
}
