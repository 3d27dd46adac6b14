use crate::db::PlateStore;
use crate::error::StoreError;
use crate::recognition::Recognizer;
use crate::registry::Registry;
use crate::report::{FrameId, FrameOutcome, ReportEntry, RunReport, Skip, Validation};
use crate::types::{Detection, Frame, PlateRecord};
use crate::validate::reconcile;
use futures::{future, stream, StreamExt};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Stops the pipeline from taking further frames off its queue. Frames already
/// in flight run to completion.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A frame whose recognition produced a plate.
struct Recognized {
    frame: FrameId,
    detection: Detection,
}

/// Drives each frame through recognition, dedup, registry cross-validation
/// and persistence.
///
/// Recognition runs up to `workers` frames at once and hands results on in
/// frame order. Dedup then claims each new plate one frame at a time, so the
/// first frame to show a plate is the one that gets cross-validated and
/// stored. Cross-validation and the insert run concurrently again.
///
/// Frame images are read from disk only once a worker picks the frame up, and
/// store calls run on the blocking pool.
pub struct Pipeline<R, V> {
    recognizer: R,
    registry: V,
    store: Arc<PlateStore>,
    workers: usize,
    cancelled: Arc<AtomicBool>,
}

impl<R: Recognizer, V: Registry> Pipeline<R, V> {
    pub fn new(recognizer: R, registry: V, store: Arc<PlateStore>, workers: usize) -> Self {
        Pipeline {
            recognizer,
            registry,
            store,
            workers: workers.max(1),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancelled.clone())
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub async fn run(&self, frames: Vec<Frame>) -> RunReport {
        let total = frames.len();
        info!("Processing {} frames with {} workers", total, self.workers);
        let claims: Claims = Arc::default();
        let claims = &claims;

        let outcomes: Vec<FrameOutcome> = stream::iter(frames)
            .take_while(|_| future::ready(!self.is_cancelled()))
            .map(|frame| self.recognize(frame))
            .buffered(self.workers)
            .then(|recognized| async move {
                match recognized {
                    Ok(recognized) => self.claim(claims.clone(), recognized).await,
                    Err(skip) => Err(skip),
                }
            })
            .map(|claimed| async move {
                match claimed {
                    Ok(recognized) => self.cross_validate_and_store(claims, recognized).await,
                    Err(skip) => skip.into(),
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let cancelled = self.is_cancelled();
        if cancelled {
            warn!(
                "Run cancelled after {} of {} frames",
                outcomes.len(),
                total
            );
        }
        RunReport::new(total, outcomes, cancelled)
    }

    async fn recognize(&self, frame: Frame) -> Result<Recognized, Skip> {
        debug!("Sampled frame {}", frame.name);
        let image = frame.read().await;
        let id = FrameId {
            index: frame.index,
            name: frame.name,
        };
        let image = match image {
            Ok(image) => image,
            Err(e) => {
                warn!("Unable to read frame {}: {}", id.name, e);
                return Err(Skip::Failed {
                    frame: id,
                    reason: format!("unable to read frame: {}", e),
                });
            }
        };
        match self.recognizer.recognize(&image).await {
            Ok(Some(detection)) => {
                info!(
                    "Frame {} recognized plate {} ({}%)",
                    id.name, detection.plate, detection.plate_confidence
                );
                Ok(Recognized {
                    frame: id,
                    detection,
                })
            }
            Ok(None) => {
                info!("Could not identify a licence plate within {}", id.name);
                Err(Skip::Rejected(id))
            }
            Err(e) => {
                warn!("Skipping frame {}: {}", id.name, e);
                Err(Skip::Failed {
                    frame: id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Claims a plate for this frame unless it is stored or already claimed.
    /// The store lookup runs on the blocking pool.
    async fn claim(&self, claims: Claims, recognized: Recognized) -> Result<Recognized, Skip> {
        let frame = recognized.frame.clone();
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || claim_plate(&store, &claims, recognized))
            .await
            .unwrap_or_else(|e| {
                error!("Dedup task for {} failed: {}", frame.name, e);
                Err(Skip::Failed {
                    frame,
                    reason: format!("dedup task failed: {}", e),
                })
            })
    }

    async fn cross_validate_and_store(&self, claims: &Claims, recognized: Recognized) -> FrameOutcome {
        let Recognized { frame, detection } = recognized;
        let plate = detection.plate.clone();
        let (registry, validation) = match self.registry.lookup(&plate).await {
            Ok(registry) => {
                let outcome = reconcile(&detection, &registry);
                info!("Plate {} cross-validated: {}", plate, outcome.verdict);
                (Some(registry), Validation::Checked(outcome))
            }
            Err(e) => {
                warn!("Cannot cross-validate plate {}: {}", plate, e);
                (None, Validation::Unavailable(e.to_string()))
            }
        };
        let record = PlateRecord {
            detection,
            registry,
        };

        let store = self.store.clone();
        let stored = tokio::task::spawn_blocking(move || {
            let stored = store.insert(&record);
            (record, stored)
        })
        .await;
        claims
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&plate);
        match stored {
            Ok((record, Ok(()))) => FrameOutcome::Persisted(ReportEntry {
                frame,
                record,
                validation,
            }),
            Ok((_, Err(StoreError::DuplicateKey(_)))) => {
                warn!("Plate {} was stored by another writer, skipping {}", plate, frame.name);
                Skip::AlreadySeen { frame, plate }.into()
            }
            Ok((_, Err(e))) => {
                error!("Error storing plate {}: {}", plate, e);
                Skip::Failed {
                    frame,
                    reason: e.to_string(),
                }
                .into()
            }
            Err(e) => {
                error!("Store task for plate {} failed: {}", plate, e);
                Skip::Failed {
                    frame,
                    reason: format!("store task failed: {}", e),
                }
                .into()
            }
        }
    }
}

/// Plates that are being cross-validated but not yet stored.
type Claims = Arc<Mutex<HashSet<String>>>;

// The existence check and the claim happen under one lock.
fn claim_plate(
    store: &PlateStore,
    claims: &Mutex<HashSet<String>>,
    recognized: Recognized,
) -> Result<Recognized, Skip> {
    let plate = &recognized.detection.plate;
    let mut claimed = claims.lock().unwrap_or_else(|p| p.into_inner());
    let seen = if claimed.contains(plate) {
        true
    } else {
        match store.exists(plate) {
            Ok(exists) => exists,
            Err(e) => {
                error!("Unable to check plate {} in store: {}", plate, e);
                return Err(Skip::Failed {
                    frame: recognized.frame,
                    reason: e.to_string(),
                });
            }
        }
    };
    if seen {
        info!("Plate {} already seen, skipping {}", plate, recognized.frame.name);
        return Err(Skip::AlreadySeen {
            plate: plate.clone(),
            frame: recognized.frame,
        });
    }
    claimed.insert(plate.clone());
    Ok(recognized)
}
