//! Execution strategies for the detect / unblend pipeline.
//!
//! The same numeric pipeline can run on a dedicated worker thread, with
//! requests and responses crossing a channel pair, or inline on the caller's
//! thread. Both backends produce bit-identical results; which one runs is
//! decided once when the dispatcher is built and is invisible to callers.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use image::RgbaImage;

use crate::blending;
use crate::detection::{self, Detection, DetectionParams};
use crate::error::{Error, Result};
use crate::mask::AlphaMask;

/// How the dispatcher should execute its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Offload to a worker thread when more than one core is available,
    /// otherwise run on the caller's thread.
    Auto,
    /// Always offload to a worker thread.
    Worker,
    /// Always run on the caller's thread.
    Direct,
}

impl Strategy {
    fn offload(self) -> bool {
        match self {
            Strategy::Worker => true,
            Strategy::Direct => false,
            Strategy::Auto => thread::available_parallelism()
                .map(|n| n.get() > 1)
                .unwrap_or(false),
        }
    }
}

/// Outcome of one full process call.
///
/// Ownership of the buffer returns to the caller; when no watermark was
/// detected it comes back untouched.
#[derive(Debug)]
pub struct Outcome {
    /// Whether the watermark was detected (and therefore removed).
    pub detected: bool,
    /// Diagnostics from the detection pass.
    pub detection: Detection,
    /// The processed (or untouched) pixel buffer.
    pub image: RgbaImage,
}

enum Request {
    Detect {
        image: RgbaImage,
        mask: Arc<AlphaMask>,
        params: DetectionParams,
    },
    Unblend {
        image: RgbaImage,
        mask: Arc<AlphaMask>,
    },
}

enum Response {
    Detect(Detection),
    Unblend(RgbaImage),
}

trait ExecBackend: Send + Sync {
    fn detect(
        &self,
        image: &RgbaImage,
        mask: &Arc<AlphaMask>,
        params: &DetectionParams,
    ) -> Result<Detection>;

    fn unblend(&self, image: RgbaImage, mask: &Arc<AlphaMask>) -> Result<RgbaImage>;
}

/// Runs the pipeline inline on the caller's thread.
struct DirectBackend;

impl ExecBackend for DirectBackend {
    fn detect(
        &self,
        image: &RgbaImage,
        mask: &Arc<AlphaMask>,
        params: &DetectionParams,
    ) -> Result<Detection> {
        Ok(detection::detect_watermark(image, mask, params))
    }

    fn unblend(&self, mut image: RgbaImage, mask: &Arc<AlphaMask>) -> Result<RgbaImage> {
        blending::unblend_watermark(&mut image, mask);
        Ok(image)
    }
}

/// Runs the pipeline on a dedicated worker thread.
///
/// One request is in flight at a time: the channel pair sits behind a mutex,
/// so each caller sends its request and receives the matching response before
/// another can enter. There is no cancellation or timeout; a stalled worker
/// stalls its caller.
struct WorkerBackend {
    channel: Mutex<Option<(Sender<Request>, Receiver<Response>)>>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerBackend {
    fn spawn() -> Result<Self> {
        let (req_tx, req_rx) = crossbeam_channel::unbounded::<Request>();
        let (resp_tx, resp_rx) = crossbeam_channel::unbounded::<Response>();

        let handle = thread::Builder::new()
            .name("unwatermark-worker".into())
            .spawn(move || worker_loop(&req_rx, &resp_tx))?;

        Ok(Self {
            channel: Mutex::new(Some((req_tx, resp_rx))),
            handle: Some(handle),
        })
    }

    fn round_trip(&self, request: Request) -> Result<Response> {
        let guard = self.channel.lock().map_err(|_| Error::WorkerStopped)?;
        let (tx, rx) = guard.as_ref().ok_or(Error::WorkerStopped)?;
        tx.send(request).map_err(|_| Error::WorkerStopped)?;
        rx.recv().map_err(|_| Error::WorkerStopped)
    }
}

impl ExecBackend for WorkerBackend {
    fn detect(
        &self,
        image: &RgbaImage,
        mask: &Arc<AlphaMask>,
        params: &DetectionParams,
    ) -> Result<Detection> {
        // The detect response carries no pixels, so the caller keeps its
        // buffer by cloning at dispatch.
        let request = Request::Detect {
            image: image.clone(),
            mask: Arc::clone(mask),
            params: params.clone(),
        };
        match self.round_trip(request)? {
            Response::Detect(result) => Ok(result),
            Response::Unblend(_) => unreachable!("response kind mismatch"),
        }
    }

    fn unblend(&self, image: RgbaImage, mask: &Arc<AlphaMask>) -> Result<RgbaImage> {
        // The buffer moves into the request and back out of the response.
        let request = Request::Unblend {
            image,
            mask: Arc::clone(mask),
        };
        match self.round_trip(request)? {
            Response::Unblend(image) => Ok(image),
            Response::Detect(_) => unreachable!("response kind mismatch"),
        }
    }
}

impl Drop for WorkerBackend {
    fn drop(&mut self) {
        // Hanging up the request channel ends the worker loop.
        if let Ok(mut guard) = self.channel.lock() {
            guard.take();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(rx: &Receiver<Request>, tx: &Sender<Response>) {
    log::debug!("worker thread started");
    while let Ok(request) = rx.recv() {
        let response = match request {
            Request::Detect {
                image,
                mask,
                params,
            } => Response::Detect(detection::detect_watermark(&image, &mask, &params)),
            Request::Unblend { mut image, mask } => {
                blending::unblend_watermark(&mut image, &mask);
                Response::Unblend(image)
            }
        };
        if tx.send(response).is_err() {
            break;
        }
    }
    log::debug!("worker thread stopped");
}

/// Routes an image through detection and, on a positive verdict, unblending.
///
/// Built once at startup with a [`Strategy`]; every call after that goes
/// through whichever backend was chosen.
pub struct Dispatcher {
    backend: Box<dyn ExecBackend>,
}

impl Dispatcher {
    /// Build a dispatcher, spawning the worker thread if the strategy calls
    /// for one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the worker thread cannot be spawned.
    pub fn new(strategy: Strategy) -> Result<Self> {
        let backend: Box<dyn ExecBackend> = if strategy.offload() {
            log::info!("dispatcher: worker thread backend");
            Box::new(WorkerBackend::spawn()?)
        } else {
            log::info!("dispatcher: direct backend");
            Box::new(DirectBackend)
        };
        Ok(Self { backend })
    }

    /// Run the detection pass only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerStopped`] if the worker backend died.
    pub fn detect(
        &self,
        image: &RgbaImage,
        mask: &Arc<AlphaMask>,
        params: &DetectionParams,
    ) -> Result<Detection> {
        self.backend.detect(image, mask, params)
    }

    /// Run the unblending pass unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerStopped`] if the worker backend died.
    pub fn unblend(&self, image: RgbaImage, mask: &Arc<AlphaMask>) -> Result<RgbaImage> {
        self.backend.unblend(image, mask)
    }

    /// Detect, then unblend on a positive verdict.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerStopped`] if the worker backend died.
    pub fn process(
        &self,
        image: RgbaImage,
        mask: &Arc<AlphaMask>,
        params: &DetectionParams,
    ) -> Result<Outcome> {
        let detection = self.backend.detect(&image, mask, params)?;
        if !detection.detected {
            return Ok(Outcome {
                detected: false,
                detection,
                image,
            });
        }

        let image = self.backend.unblend(image, mask)?;
        Ok(Outcome {
            detected: true,
            detection,
            image,
        })
    }
}
