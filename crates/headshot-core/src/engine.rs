use crate::backend::ModelLoader;
use crate::detector::DetectorError;
use crate::types::Candidate;
use image::RgbImage;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Detect {
        image: Arc<RgbImage>,
        reply: oneshot::Sender<Result<Vec<Candidate>, DetectorError>>,
    },
}

/// Clone-safe handle to the detector engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run the loaded model against one image.
    pub async fn detect(&self, image: Arc<RgbImage>) -> Result<Vec<Candidate>, DetectorError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Detect {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| DetectorError::ChannelClosed)?;
        reply_rx.await.map_err(|_| DetectorError::ChannelClosed)?
    }
}

/// Spawn the model on a dedicated OS thread.
///
/// The loader runs on that thread (weight fetch included). Resolves once the
/// model is loaded, or with the load error.
pub async fn spawn_engine(
    loader: Arc<dyn ModelLoader>,
    score_floor: f32,
) -> Result<EngineHandle, DetectorError> {
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), DetectorError>>();
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("headshot-detector".into())
        .spawn(move || {
            let mut model = match loader.load(score_floor) {
                Ok(model) => {
                    let _ = ready_tx.send(Ok(()));
                    model
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            tracing::info!("detector engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Detect { image, reply } => {
                        let _ = reply.send(model.detect(&image));
                    }
                }
            }
            tracing::info!("detector engine thread exiting");
        })?;

    ready_rx.await.map_err(|_| DetectorError::ChannelClosed)??;
    Ok(EngineHandle { tx })
}
