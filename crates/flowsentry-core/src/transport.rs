//! Channel transport between the master and one worker.
//!
//! Each worker is connected by a duplex [`link`]: a window channel carrying
//! `WindowMeta`/`WindowData` frames, a result channel carrying
//! `ResultMeta`/`ResultData` frames, and a dedicated terminate channel so a
//! resident worker can be stopped without queueing behind pending windows.
//! Every channel is FIFO, which gives the pairwise in-order delivery the
//! message schema assumes. A disconnected channel is fatal on the master
//! side and equivalent to termination on the worker side.

use crossbeam_channel::{Receiver, Sender, unbounded};
use thiserror::Error;

use crate::wire::{Frame, Tag, WireError, codec};
use crate::{FlowWindow, WindowResult};

/// Errors raised by transport operations. Corruption and disconnects abort
/// the affected endpoint; they are never retried.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport channel disconnected")]
    Disconnected,
    #[error("unexpected frame: expected {expected:?}, got {got:?}")]
    UnexpectedFrame { expected: Tag, got: Tag },
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Master-side endpoint of one worker link.
pub struct MasterLink {
    window_tx: Sender<Frame>,
    terminate_tx: Sender<Frame>,
    result_rx: Receiver<Frame>,
}

/// Worker-side endpoint of one worker link.
pub struct WorkerLink {
    window_rx: Receiver<Frame>,
    terminate_rx: Receiver<Frame>,
    result_tx: Sender<Frame>,
}

/// Creates one master/worker link pair.
pub fn link() -> (MasterLink, WorkerLink) {
    let (window_tx, window_rx) = unbounded();
    let (terminate_tx, terminate_rx) = unbounded();
    let (result_tx, result_rx) = unbounded();
    (
        MasterLink {
            window_tx,
            terminate_tx,
            result_rx,
        },
        WorkerLink {
            window_rx,
            terminate_rx,
            result_tx,
        },
    )
}

impl MasterLink {
    /// Sends a window as meta plus, when non-empty, a flow payload frame.
    pub fn send_window(&self, window: &FlowWindow) -> Result<(), TransportError> {
        self.window_tx
            .send(Frame::new(Tag::WindowMeta, codec::encode_window_meta(window)))
            .map_err(|_| TransportError::Disconnected)?;
        if !window.flows.is_empty() {
            self.window_tx
                .send(Frame::new(Tag::WindowData, codec::encode_flows(&window.flows)))
                .map_err(|_| TransportError::Disconnected)?;
        }
        Ok(())
    }

    /// Sends the out-of-band terminate packet (live-mode shutdown).
    pub fn send_terminate(&self) {
        // The worker may already be gone; that is the desired end state.
        let _ = self.terminate_tx.send(Frame::new(Tag::Terminate, Vec::new()));
    }

    /// Receives one complete result: meta, metrics, then the suspect block.
    ///
    /// Blocks until the first frame arrives; callers use
    /// [`MasterLink::result_receiver`] with a `Select` to wait across
    /// workers first.
    pub fn recv_result(&self) -> Result<WindowResult, TransportError> {
        let meta = recv_expect(&self.result_rx, Tag::ResultMeta)?;
        self.finish_recv_result(meta)
    }

    /// Completes a result receive whose meta frame was already pulled off
    /// the channel by an any-source select.
    pub(crate) fn finish_recv_result(&self, meta: Frame) -> Result<WindowResult, TransportError> {
        if meta.tag != Tag::ResultMeta {
            return Err(TransportError::UnexpectedFrame {
                expected: Tag::ResultMeta,
                got: meta.tag,
            });
        }
        let mut result = codec::decode_result_meta(&meta.payload)?;
        let metrics = recv_expect(&self.result_rx, Tag::ResultData)?;
        codec::apply_result_metrics(&mut result, &metrics.payload)?;
        let suspects = recv_expect(&self.result_rx, Tag::ResultData)?;
        result.suspects = codec::decode_suspects(&suspects.payload)?;
        Ok(result)
    }

    /// Raw receiver handle for any-source readiness selection.
    pub fn result_receiver(&self) -> &Receiver<Frame> {
        &self.result_rx
    }
}

impl WorkerLink {
    /// Receives the next window, or `None` on termination.
    ///
    /// The terminate channel is probed first so a queued stop wins over
    /// queued work; otherwise the call blocks until either channel yields.
    /// The in-band terminate (window id −1) is returned as a normal window
    /// for the worker loop to inspect.
    pub fn recv_window(&self) -> Result<Option<FlowWindow>, TransportError> {
        if self.terminate_rx.try_recv().is_ok() {
            return Ok(None);
        }

        let meta_frame = crossbeam_channel::select! {
            recv(self.terminate_rx) -> _ => return Ok(None),
            recv(self.window_rx) -> frame => match frame {
                Ok(frame) => frame,
                Err(_) => return Ok(None),
            },
        };
        if meta_frame.tag != Tag::WindowMeta {
            return Err(TransportError::UnexpectedFrame {
                expected: Tag::WindowMeta,
                got: meta_frame.tag,
            });
        }
        let meta = codec::decode_window_meta(&meta_frame.payload)?;

        let flows = if meta.flow_count > 0 {
            let data = recv_expect(&self.window_rx, Tag::WindowData)?;
            codec::decode_flows(&data.payload, meta.flow_count)?
        } else {
            Vec::new()
        };

        Ok(Some(FlowWindow {
            window_id: meta.window_id,
            start_row: meta.start_row,
            end_row: meta.end_row,
            flows,
        }))
    }

    /// Sends one complete result back to the master.
    pub fn send_result(&self, result: &WindowResult) -> Result<(), TransportError> {
        for frame in [
            Frame::new(Tag::ResultMeta, codec::encode_result_meta(result)),
            Frame::new(Tag::ResultData, codec::encode_result_metrics(result)),
            Frame::new(Tag::ResultData, codec::encode_suspects(&result.suspects)),
        ] {
            self.result_tx
                .send(frame)
                .map_err(|_| TransportError::Disconnected)?;
        }
        Ok(())
    }
}

fn recv_expect(rx: &Receiver<Frame>, expected: Tag) -> Result<Frame, TransportError> {
    let frame = rx.recv().map_err(|_| TransportError::Disconnected)?;
    if frame.tag != expected {
        return Err(TransportError::UnexpectedFrame {
            expected,
            got: frame.tag,
        });
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::link;
    use crate::{FlowRecord, FlowWindow, WindowResult};

    fn sample_window() -> FlowWindow {
        FlowWindow {
            window_id: 5,
            start_row: 2500,
            end_row: 2501,
            flows: vec![
                FlowRecord {
                    src_addr: "10.1.1.1".to_string(),
                    dst_addr: "10.2.2.2".to_string(),
                    ..FlowRecord::default()
                },
                FlowRecord::default(),
            ],
        }
    }

    #[test]
    fn window_travels_intact() {
        let (master, worker) = link();
        master.send_window(&sample_window()).expect("send");
        let received = worker.recv_window().expect("recv").expect("window");
        assert_eq!(received, sample_window());
    }

    #[test]
    fn result_travels_intact() {
        let (master, worker) = link();
        let mut result = WindowResult {
            window_id: 5,
            flow_count: 2,
            entropy_score: 0.4,
            entropy_pred: true,
            combined_pred: true,
            ..WindowResult::default()
        };
        result.suspects.add_with_count("10.1.1.1", 2);

        worker.send_result(&result).expect("send");
        let received = master.recv_result().expect("recv");
        assert_eq!(received, result);
    }

    #[test]
    fn terminate_packet_wins_over_queued_windows() {
        let (master, worker) = link();
        master.send_window(&sample_window()).expect("send");
        master.send_terminate();
        assert!(worker.recv_window().expect("recv").is_none());
    }

    #[test]
    fn master_disconnect_reads_as_termination() {
        let (master, worker) = link();
        drop(master);
        assert!(worker.recv_window().expect("recv").is_none());
    }

    #[test]
    fn inband_terminate_is_delivered_as_a_window() {
        let (master, worker) = link();
        master.send_window(&FlowWindow::terminate()).expect("send");
        let window = worker.recv_window().expect("recv").expect("window");
        assert!(window.is_terminate());
    }
}
