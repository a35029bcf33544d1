//! Alert codes raised as a side effect of record validation.
//!
//! The shim does not encode alert records onto the wire itself; it hands
//! alert codes to an [`AlertSink`] chosen by the caller. Tests typically use
//! an [`AlertRecorder`] to assert that a given malformed input raised
//! exactly one alert.

use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    CloseNotify,
    UnexpectedMessage,
    BadRecordMac,
    RecordOverflow,
    HandshakeFailure,
    IllegalParameter,
    ProtocolVersion,
    InternalError,
    Unknown(u8),
}

impl Alert {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Alert::CloseNotify,
            10 => Alert::UnexpectedMessage,
            20 => Alert::BadRecordMac,
            22 => Alert::RecordOverflow,
            40 => Alert::HandshakeFailure,
            47 => Alert::IllegalParameter,
            70 => Alert::ProtocolVersion,
            80 => Alert::InternalError,
            _ => Alert::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Alert::CloseNotify => 0,
            Alert::UnexpectedMessage => 10,
            Alert::BadRecordMac => 20,
            Alert::RecordOverflow => 22,
            Alert::HandshakeFailure => 40,
            Alert::IllegalParameter => 47,
            Alert::ProtocolVersion => 70,
            Alert::InternalError => 80,
            Alert::Unknown(value) => *value,
        }
    }
}

/// Receiver for alerts raised during record validation.
///
/// The wire encoding of alert records is the caller's concern; the
/// connection only reports which alert a validation failure produced.
pub trait AlertSink {
    fn send_alert(&mut self, alert: Alert);
}

/// Discards all alerts.
#[derive(Debug, Default)]
pub struct NullAlertSink;

impl AlertSink for NullAlertSink {
    fn send_alert(&mut self, alert: Alert) {
        debug!("Dropping alert {:?}", alert);
    }
}

/// Records alerts for later inspection.
///
/// Cloning shares the underlying list, so a test can keep one handle and
/// give the other to the connection.
#[derive(Debug, Clone, Default)]
pub struct AlertRecorder {
    alerts: Rc<RefCell<Vec<Alert>>>,
}

impl AlertRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of alerts recorded so far.
    pub fn count(&self) -> usize {
        self.alerts.borrow().len()
    }

    /// Take all recorded alerts, leaving the recorder empty.
    pub fn take(&self) -> Vec<Alert> {
        std::mem::take(&mut *self.alerts.borrow_mut())
    }
}

impl AlertSink for AlertRecorder {
    fn send_alert(&mut self, alert: Alert) {
        self.alerts.borrow_mut().push(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_code_roundtrip() {
        for v in [0u8, 10, 20, 22, 40, 47, 70, 80, 113] {
            assert_eq!(Alert::from_u8(v).as_u8(), v);
        }
    }

    #[test]
    fn recorder_handles_share_alerts() {
        let recorder = AlertRecorder::new();
        let mut sink = recorder.clone();
        sink.send_alert(Alert::IllegalParameter);

        assert_eq!(recorder.count(), 1);
        assert_eq!(recorder.take(), vec![Alert::IllegalParameter]);
        assert_eq!(recorder.count(), 0);
    }
}
