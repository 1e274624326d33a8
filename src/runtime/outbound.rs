//! Activation gate in front of the write loop.
//!
//! Module-initiated frames are held in a FIFO buffer until the host sends the
//! activation hook, and again after a deactivation. The lifecycle state lives
//! under the same lock as the buffer so that a send racing an activation
//! either lands in the buffer before the flush or goes straight out after it.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

use super::ModuleState;
use crate::error::{ModuleError, Result};

#[derive(Debug)]
struct Gate {
    state: ModuleState,
    buffer: VecDeque<Vec<u8>>,
    sink: Option<UnboundedSender<Vec<u8>>>,
}

/// Outbound frame path shared by callers and dispatch tasks.
#[derive(Debug)]
pub struct OutboundGate {
    gate: Mutex<Gate>,
}

impl Default for OutboundGate {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundGate {
    /// A gate for a runtime that has not connected yet.
    pub fn new() -> Self {
        Self {
            gate: Mutex::new(Gate {
                state: ModuleState::Uninitialized,
                buffer: VecDeque::new(),
                sink: None,
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModuleState {
        self.lock().state
    }

    /// Number of frames waiting for activation.
    pub fn buffered(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Claim the gate for a connection attempt.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` unless the runtime is still uninitialized, or
    /// `ConnectionClosed` once it has been closed.
    pub fn begin_connecting(&self) -> Result<()> {
        let mut gate = self.lock();
        match gate.state {
            ModuleState::Uninitialized => {
                gate.state = ModuleState::Connecting;
                Ok(())
            }
            ModuleState::Closed => Err(ModuleError::ConnectionClosed),
            _ => Err(ModuleError::AlreadyRegistered),
        }
    }

    /// Return to `Uninitialized` after a failed connection attempt.
    pub fn abort_connecting(&self) {
        let mut gate = self.lock();
        if gate.state == ModuleState::Connecting {
            gate.state = ModuleState::Uninitialized;
        }
    }

    /// Attach the write loop's queue; the runtime now awaits activation.
    ///
    /// Returns false if the gate was closed while the channel was opening.
    pub fn attach(&self, sink: UnboundedSender<Vec<u8>>) -> bool {
        let mut gate = self.lock();
        if gate.state != ModuleState::Connecting {
            return false;
        }
        gate.sink = Some(sink);
        gate.state = ModuleState::AwaitingActivation;
        true
    }

    /// Send a module-initiated frame, buffering it unless active.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before the channel is attached, or
    /// `ConnectionClosed` after close.
    pub fn send(&self, frame: Vec<u8>) -> Result<()> {
        let mut gate = self.lock();
        match gate.state {
            ModuleState::Uninitialized | ModuleState::Connecting => Err(ModuleError::NotInitialized),
            ModuleState::Closed => Err(ModuleError::ConnectionClosed),
            ModuleState::AwaitingActivation | ModuleState::Deactivated => {
                gate.buffer.push_back(frame);
                log::debug!("[Juno] Buffered frame ({} pending)", gate.buffer.len());
                Ok(())
            }
            ModuleState::Active => Self::write(&gate, frame),
        }
    }

    /// Send a frame regardless of activation (registration and replies to
    /// host-issued requests).
    ///
    /// # Errors
    ///
    /// `NotInitialized` before the channel is attached, or
    /// `ConnectionClosed` after close.
    pub fn send_direct(&self, frame: Vec<u8>) -> Result<()> {
        let gate = self.lock();
        match gate.state {
            ModuleState::Uninitialized | ModuleState::Connecting => Err(ModuleError::NotInitialized),
            ModuleState::Closed => Err(ModuleError::ConnectionClosed),
            _ => Self::write(&gate, frame),
        }
    }

    /// Enter `Active` and flush the buffer as a single write, in send order.
    ///
    /// Returns the number of frames flushed.
    pub fn activate(&self) -> usize {
        let mut gate = self.lock();
        match gate.state {
            ModuleState::AwaitingActivation | ModuleState::Deactivated => {}
            ModuleState::Active => return 0,
            state => {
                log::warn!("[Juno] Ignoring activation in state {state:?}");
                return 0;
            }
        }
        gate.state = ModuleState::Active;

        let count = gate.buffer.len();
        if count > 0 {
            let batch: Vec<u8> = gate.buffer.drain(..).flatten().collect();
            if let Err(e) = Self::write(&gate, batch) {
                log::error!("[Juno] Failed to flush {count} buffered frames: {e}");
            }
        }
        log::info!("[Juno] Module activated, flushed {count} buffered frames");
        count
    }

    /// Leave `Active`; later sends buffer again.
    pub fn deactivate(&self) {
        let mut gate = self.lock();
        if gate.state == ModuleState::Active {
            gate.state = ModuleState::Deactivated;
            log::info!("[Juno] Module deactivated");
        }
    }

    /// Enter `Closed`, dropping the buffer and the write queue.
    ///
    /// Returns false if the gate was already closed.
    pub fn close(&self) -> bool {
        let mut gate = self.lock();
        if gate.state == ModuleState::Closed {
            return false;
        }
        gate.state = ModuleState::Closed;
        let dropped = gate.buffer.len();
        gate.buffer.clear();
        gate.sink = None;
        if dropped > 0 {
            log::debug!("[Juno] Dropped {dropped} buffered frames on close");
        }
        true
    }

    fn write(gate: &Gate, frame: Vec<u8>) -> Result<()> {
        let sink = gate.sink.as_ref().ok_or(ModuleError::NotInitialized)?;
        if sink.send(frame).is_err() {
            // Write loop has exited.
            return Err(ModuleError::ConnectionClosed);
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Gate> {
        self.gate.lock().expect("outbound gate mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn attached() -> (OutboundGate, mpsc::UnboundedReceiver<Vec<u8>>) {
        let gate = OutboundGate::new();
        let (tx, rx) = mpsc::unbounded_channel();
        gate.begin_connecting().unwrap();
        assert!(gate.attach(tx));
        (gate, rx)
    }

    #[test]
    fn test_send_before_attach_is_not_initialized() {
        let gate = OutboundGate::new();
        assert_eq!(gate.send(b"x\n".to_vec()), Err(ModuleError::NotInitialized));
        assert_eq!(gate.send_direct(b"x\n".to_vec()), Err(ModuleError::NotInitialized));
    }

    #[test]
    fn test_buffers_until_activation() {
        let (gate, mut rx) = attached();
        gate.send(b"a\n".to_vec()).unwrap();
        gate.send(b"b\n".to_vec()).unwrap();
        assert_eq!(gate.buffered(), 2);
        assert!(rx.try_recv().is_err());

        assert_eq!(gate.activate(), 2);
        assert_eq!(gate.state(), ModuleState::Active);
        assert_eq!(rx.try_recv().unwrap(), b"a\nb\n".to_vec());

        gate.send(b"c\n".to_vec()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), b"c\n".to_vec());
    }

    #[test]
    fn test_direct_send_bypasses_buffer() {
        let (gate, mut rx) = attached();
        gate.send(b"queued\n".to_vec()).unwrap();
        gate.send_direct(b"register\n".to_vec()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), b"register\n".to_vec());
        assert_eq!(gate.buffered(), 1);
    }

    #[test]
    fn test_deactivation_buffers_again() {
        let (gate, mut rx) = attached();
        gate.activate();
        gate.deactivate();
        assert_eq!(gate.state(), ModuleState::Deactivated);
        gate.send(b"later\n".to_vec()).unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(gate.activate(), 1);
        assert_eq!(rx.try_recv().unwrap(), b"later\n".to_vec());
    }

    #[test]
    fn test_close_rejects_sends_and_drops_buffer() {
        let (gate, _rx) = attached();
        gate.send(b"a\n".to_vec()).unwrap();
        assert!(gate.close());
        assert!(!gate.close());
        assert_eq!(gate.buffered(), 0);
        assert_eq!(gate.send(b"b\n".to_vec()), Err(ModuleError::ConnectionClosed));
        assert_eq!(gate.activate(), 0);
        assert_eq!(gate.begin_connecting(), Err(ModuleError::ConnectionClosed));
    }

    #[test]
    fn test_second_connect_is_already_registered() {
        let (gate, _rx) = attached();
        assert_eq!(gate.begin_connecting(), Err(ModuleError::AlreadyRegistered));
    }

    #[test]
    fn test_aborted_connect_can_retry() {
        let gate = OutboundGate::new();
        gate.begin_connecting().unwrap();
        gate.abort_connecting();
        assert_eq!(gate.state(), ModuleState::Uninitialized);
        assert!(gate.begin_connecting().is_ok());
    }
}
