//! Turning images into index documents.
//!
//! [`DocumentEncoder`] extracts the configured features of one image and
//! derives the fields to index: the encoded feature (histogram field), the
//! BitSampling terms (hash field) and, for supported features, the
//! MetricSpaces terms. [`ParallelEncoder`] runs an encoder over a stream of
//! images with a pool of worker threads fed through a bounded queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, bounded};
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::{ImgsimError, Result};
use crate::feature::descriptor::{FeatureDescriptor, FeatureExtractor};
use crate::feature::registry::FeatureRegistry;
use crate::feature::vector::FeatureVector;
use crate::hashing::{HashingResources, HashingScheme};

/// Images between two progress log lines.
const PROGRESS_INTERVAL: usize = 1000;

/// An image to index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub id: String,
    pub title: Option<String>,
    /// Raw image bytes, as understood by the feature extractor.
    pub image: Vec<u8>,
}

/// Fields of one document, ready to be added to an index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedDocument {
    pub id: String,
    pub title: Option<String>,
    /// (histogram field, encoded feature)
    pub binary: Vec<(String, Vec<u8>)>,
    /// (term field, whitespace separated terms)
    pub terms: Vec<(String, String)>,
}

/// Encodes images into documents.
pub struct DocumentEncoder {
    resources: HashingResources,
    extractor: Option<Arc<dyn FeatureExtractor>>,
    features: Vec<FeatureDescriptor>,
    use_bit_sampling: bool,
    use_metric_spaces: bool,
}

impl DocumentEncoder {
    /// Encoder for the features with the given codes. Hashing with
    /// BitSampling is on, MetricSpaces off.
    pub fn new(registry: &FeatureRegistry, resources: HashingResources, codes: &[&str]) -> Result<Self> {
        let features = codes
            .iter()
            .map(|code| {
                registry
                    .by_code(code)
                    .cloned()
                    .ok_or_else(|| ImgsimError::unknown_field(*code))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DocumentEncoder {
            resources,
            extractor: None,
            features,
            use_bit_sampling: true,
            use_metric_spaces: false,
        })
    }

    /// Extractor used by [`encode`](Self::encode).
    pub fn extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn bit_sampling(mut self, enabled: bool) -> Self {
        self.use_bit_sampling = enabled;
        self
    }

    pub fn metric_spaces(mut self, enabled: bool) -> Self {
        self.use_metric_spaces = enabled;
        self
    }

    pub fn features(&self) -> &[FeatureDescriptor] {
        &self.features
    }

    /// Extract every configured feature of an image and encode the document.
    pub fn encode(&self, source: &ImageSource) -> Result<EncodedDocument> {
        let extractor = self
            .extractor
            .as_ref()
            .ok_or_else(|| ImgsimError::invalid_argument("no feature extractor configured"))?;

        let mut doc = self.empty_document(&source.id, source.title.as_deref());
        for descriptor in &self.features {
            let vector = extractor.extract(descriptor, &source.image)?;
            self.add_feature(&mut doc, descriptor, &vector)?;
        }
        Ok(doc)
    }

    /// Encode a document from precomputed features, given as
    /// (feature code, vector) pairs. Codes outside the configured features
    /// are rejected.
    pub fn encode_features(
        &self,
        id: &str,
        title: Option<&str>,
        features: &[(&str, FeatureVector)],
    ) -> Result<EncodedDocument> {
        let mut doc = self.empty_document(id, title);
        for (code, vector) in features {
            let descriptor = self
                .features
                .iter()
                .find(|d| d.code() == *code)
                .ok_or_else(|| ImgsimError::unknown_field(*code))?;
            self.add_feature(&mut doc, descriptor, vector)?;
        }
        Ok(doc)
    }

    fn empty_document(&self, id: &str, title: Option<&str>) -> EncodedDocument {
        EncodedDocument {
            id: id.to_string(),
            title: title.map(str::to_string),
            ..EncodedDocument::default()
        }
    }

    fn add_feature(
        &self,
        doc: &mut EncodedDocument,
        descriptor: &FeatureDescriptor,
        vector: &FeatureVector,
    ) -> Result<()> {
        doc.binary
            .push((descriptor.histogram_field(), descriptor.encode(vector)?));

        let mut schemes: Vec<&dyn HashingScheme> = Vec::with_capacity(2);
        if self.use_bit_sampling {
            schemes.push(self.resources.bit_sampling.as_ref());
        }
        if self.use_metric_spaces {
            schemes.push(self.resources.metric_spaces.as_ref());
        }

        for scheme in schemes {
            if scheme.supports(descriptor) {
                doc.terms.push((
                    scheme.field_name(descriptor),
                    scheme.index_terms(descriptor, vector)?,
                ));
            } else {
                debug!(scheme = scheme.name(), feature = descriptor.code(), "scheme skipped");
            }
        }
        Ok(())
    }
}

/// Counters of one ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub submitted: usize,
    pub encoded: usize,
    pub failed: usize,
}

enum WorkItem {
    Image(ImageSource),
    Shutdown,
}

/// Runs a [`DocumentEncoder`] on a worker pool.
pub struct ParallelEncoder {
    encoder: Arc<DocumentEncoder>,
    workers: usize,
    queue_capacity: usize,
}

impl ParallelEncoder {
    pub fn new(encoder: DocumentEncoder, config: &IngestConfig) -> Self {
        ParallelEncoder {
            encoder: Arc::new(encoder),
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Encode every source and hand the documents to `sink`, from the worker
    /// threads and in no particular order.
    ///
    /// Failures to encode or store a document are logged and counted; they
    /// never stop the run.
    pub fn run<S, F>(&self, sources: S, sink: F) -> Result<IngestReport>
    where
        S: IntoIterator<Item = ImageSource>,
        F: Fn(EncodedDocument) -> Result<()> + Sync,
    {
        let encoded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        let submitted = thread::scope(|scope| -> Result<usize> {
            let (sender, receiver) = bounded::<WorkItem>(self.queue_capacity);

            for worker in 0..self.workers {
                let receiver = receiver.clone();
                let (sink, encoded, failed) = (&sink, &encoded, &failed);
                thread::Builder::new()
                    .name(format!("imgsim-encoder-{worker}"))
                    .spawn_scoped(scope, move || {
                        self.work(receiver, sink, encoded, failed)
                    })?;
            }
            // Only workers hold receivers, so sends fail once they are all gone.
            drop(receiver);

            let mut submitted = 0;
            for source in sources {
                sender
                    .send(WorkItem::Image(source))
                    .map_err(|_| ImgsimError::other("encoder workers stopped"))?;
                submitted += 1;
                if submitted % PROGRESS_INTERVAL == 0 {
                    info!(
                        submitted,
                        encoded = encoded.load(Ordering::Relaxed),
                        queued = sender.len(),
                        "ingestion progress"
                    );
                }
            }

            // One sentinel per worker, each worker stops at its first.
            for _ in 0..self.workers {
                if sender.send(WorkItem::Shutdown).is_err() {
                    break;
                }
            }
            Ok(submitted)
        })?;

        let report = IngestReport {
            submitted,
            encoded: encoded.into_inner(),
            failed: failed.into_inner(),
        };
        info!(
            submitted = report.submitted,
            encoded = report.encoded,
            failed = report.failed,
            "ingestion finished"
        );
        Ok(report)
    }

    fn work<F>(
        &self,
        receiver: Receiver<WorkItem>,
        sink: &F,
        encoded: &AtomicUsize,
        failed: &AtomicUsize,
    ) where
        F: Fn(EncodedDocument) -> Result<()> + Sync,
    {
        while let Ok(WorkItem::Image(source)) = receiver.recv() {
            match self.encoder.encode(&source).and_then(sink) {
                Ok(()) => {
                    encoded.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(id = %source.id, error = %e, "cannot index image");
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}
