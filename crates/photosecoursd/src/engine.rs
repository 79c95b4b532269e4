use image::DynamicImage;
use photosecours_core::{AnalysisSettings, FaceValidation, ModelPaths, Pipeline, PipelineError, SkinReport, WoundReport};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
}

/// Messages sent from HTTP handlers to the engine thread.
pub(crate) enum EngineRequest {
    Validate {
        image: DynamicImage,
        reply: oneshot::Sender<Result<FaceValidation, EngineError>>,
    },
    AnalyzeSkin {
        image: DynamicImage,
        reply: oneshot::Sender<Result<SkinReport, EngineError>>,
    },
    AnalyzeWound {
        image: DynamicImage,
        reply: oneshot::Sender<Result<WoundReport, EngineError>>,
    },
}

impl EngineRequest {
    fn kind(&self) -> &'static str {
        match self {
            EngineRequest::Validate { .. } => "validate",
            EngineRequest::AnalyzeSkin { .. } => "skin",
            EngineRequest::AnalyzeWound { .. } => "wound",
        }
    }

    /// The caller timed out or went away while the request was queued.
    fn is_abandoned(&self) -> bool {
        match self {
            EngineRequest::Validate { reply, .. } => reply.is_closed(),
            EngineRequest::AnalyzeSkin { reply, .. } => reply.is_closed(),
            EngineRequest::AnalyzeWound { reply, .. } => reply.is_closed(),
        }
    }
}

/// Work the engine thread runs requests against.
pub(crate) trait Analyzer {
    fn validate_face(&mut self, image: &DynamicImage) -> Result<FaceValidation, PipelineError>;
    fn analyze_skin(&mut self, image: &DynamicImage) -> Result<SkinReport, PipelineError>;
    fn analyze_wound(&mut self, image: &DynamicImage) -> Result<WoundReport, PipelineError>;
}

impl Analyzer for Pipeline {
    fn validate_face(&mut self, image: &DynamicImage) -> Result<FaceValidation, PipelineError> {
        Pipeline::validate_face(self, image)
    }

    fn analyze_skin(&mut self, image: &DynamicImage) -> Result<SkinReport, PipelineError> {
        Pipeline::analyze_skin(self, image)
    }

    fn analyze_wound(&mut self, image: &DynamicImage) -> Result<WoundReport, PipelineError> {
        Pipeline::analyze_wound(self, image)
    }
}

/// Drain `rx` until every sender is gone. Requests whose caller already
/// gave up are dropped without running inference.
pub(crate) fn serve(rx: &mut mpsc::Receiver<EngineRequest>, analyzer: &mut impl Analyzer) {
    while let Some(req) = rx.blocking_recv() {
        if req.is_abandoned() {
            tracing::warn!(kind = req.kind(), "caller gone, skipping queued request");
            continue;
        }
        match req {
            EngineRequest::Validate { image, reply } => {
                let result = analyzer.validate_face(&image).map_err(EngineError::from);
                let _ = reply.send(result);
            }
            EngineRequest::AnalyzeSkin { image, reply } => {
                let result = analyzer.analyze_skin(&image).map_err(EngineError::from);
                let _ = reply.send(result);
            }
            EngineRequest::AnalyzeWound { image, reply } => {
                let result = analyzer.analyze_wound(&image).map_err(EngineError::from);
                let _ = reply.send(result);
            }
        }
    }
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineHandle {
    /// Run only the face gate.
    pub async fn validate(&self, image: DynamicImage) -> Result<FaceValidation, EngineError> {
        self.call(|reply| EngineRequest::Validate { image, reply }).await
    }

    /// Face gate followed by skin analysis.
    pub async fn analyze_skin(&self, image: DynamicImage) -> Result<SkinReport, EngineError> {
        self.call(|reply| EngineRequest::AnalyzeSkin { image, reply }).await
    }

    /// Wound enhancement, anonymisation and description.
    pub async fn analyze_wound(&self, image: DynamicImage) -> Result<WoundReport, EngineError> {
        self.call(|reply| EngineRequest::AnalyzeWound { image, reply }).await
    }

    async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let exchange = async {
            self.tx
                .send(request(reply_tx))
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
        };
        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| EngineError::Timeout(self.timeout))?
    }

    /// Handle with no engine thread behind it. Requests land in the returned
    /// receiver; dropping it makes every call fail with `ChannelClosed`.
    #[cfg(test)]
    pub(crate) fn detached(timeout: Duration) -> (Self, mpsc::Receiver<EngineRequest>) {
        let (tx, rx) = mpsc::channel(4);
        (Self { tx, timeout }, rx)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads every model and embeds every prompt before returning, so a missing
/// model file fails the daemon at startup rather than on the first request.
pub fn spawn_engine(
    paths: &ModelPaths,
    settings: AnalysisSettings,
    timeout: Duration,
) -> Result<EngineHandle, EngineError> {
    let mut pipeline = Pipeline::load(paths, settings)?;
    tracing::info!(
        detector = %paths.face_detector.display(),
        clip_vision = %paths.clip_vision.display(),
        "models loaded"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("photosecours-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            serve(&mut rx, &mut pipeline);
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx, timeout })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> DynamicImage {
        DynamicImage::new_rgb8(8, 8)
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (handle, rx) = EngineHandle::detached(Duration::from_secs(1));
        drop(rx);
        assert!(matches!(handle.validate(blank()).await, Err(EngineError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_dropped_reply_is_channel_closed() {
        let (handle, mut rx) = EngineHandle::detached(Duration::from_secs(1));
        tokio::spawn(async move {
            // Receive and drop the request without replying.
            let _ = rx.recv().await;
        });
        assert!(matches!(handle.analyze_wound(blank()).await, Err(EngineError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let (handle, _rx) = EngineHandle::detached(Duration::from_millis(20));
        assert!(matches!(handle.analyze_skin(blank()).await, Err(EngineError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_reply_is_forwarded() {
        let (handle, mut rx) = EngineHandle::detached(Duration::from_secs(1));
        tokio::spawn(async move {
            if let Some(EngineRequest::Validate { image, reply }) = rx.recv().await {
                let size = (image.width(), image.height());
                let _ = reply.send(Ok(FaceValidation::too_small(size, 50)));
            }
        });
        let outcome = handle.validate(blank()).await.unwrap();
        assert!(!outcome.is_valid);
        assert_eq!(outcome.details.image_size, (8, 8));
    }

    /// Counts face-gate runs; the other flows are never reached here.
    #[derive(Default)]
    struct Counting {
        validations: usize,
    }

    impl Analyzer for Counting {
        fn validate_face(&mut self, image: &DynamicImage) -> Result<FaceValidation, PipelineError> {
            self.validations += 1;
            Ok(FaceValidation::too_small((image.width(), image.height()), 50))
        }

        fn analyze_skin(&mut self, _image: &DynamicImage) -> Result<SkinReport, PipelineError> {
            unreachable!("skin analysis not requested")
        }

        fn analyze_wound(&mut self, _image: &DynamicImage) -> Result<WoundReport, PipelineError> {
            unreachable!("wound analysis not requested")
        }
    }

    #[test]
    fn test_serve_skips_abandoned_requests() {
        let (tx, mut rx) = mpsc::channel(4);

        let (abandoned_tx, abandoned_rx) = oneshot::channel();
        drop(abandoned_rx);
        tx.try_send(EngineRequest::Validate { image: blank(), reply: abandoned_tx }).unwrap();

        let (live_tx, live_rx) = oneshot::channel();
        tx.try_send(EngineRequest::Validate { image: blank(), reply: live_tx }).unwrap();
        drop(tx);

        let mut analyzer = Counting::default();
        serve(&mut rx, &mut analyzer);

        assert_eq!(analyzer.validations, 1);
        let outcome = live_rx.blocking_recv().unwrap().unwrap();
        assert_eq!(outcome.details.image_size, (8, 8));
    }

    #[test]
    fn test_spawn_fails_fast_without_models() {
        let paths = ModelPaths::from_dir(&std::env::temp_dir().join("photosecours-missing"));
        let result = spawn_engine(&paths, AnalysisSettings::default(), Duration::from_secs(1));
        assert!(matches!(result, Err(EngineError::Pipeline(_))));
    }
}
