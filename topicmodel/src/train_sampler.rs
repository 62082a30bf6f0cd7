//Copyright 2024 Felix Engl
//
//Licensed under the Apache License, Version 2.0 (the "License");
//you may not use this file except in compliance with the License.
//You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
//Unless required by applicable law or agreed to in writing, software
//distributed under the License is distributed on an "AS IS" BASIS,
//WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//See the License for the specific language governing permissions and
//limitations under the License.

//! The SparseLDA collapsed Gibbs sampler used for training.
//!
//! Maintains the three-bucket decomposition of Yao, Mimno & McCallum (2009):
//! a smoothing-only bucket `s(z)`, a document-topic bucket `r(z,d)`, and a
//! topic-word bucket `q(z,w,d)`. Each is kept current through local deltas
//! rather than full re-sums — the whole point of SparseLDA is that a single
//! word resample touches only the handful of topics with nonzero mass.
//!
//! Grounded on `training/sparselda_train_gibbs_sampler.py`.

use crate::document::Document;
use crate::error::TrainError;
use crate::histogram::NonZero;
use crate::model::{HyperParams, Model};
use crate::recordio::{RecordReader, RecordWriter};
use crate::vocabulary::{Vocabulary, WordId};
use rand::Rng;
use std::io::BufWriter;
use std::path::Path;
use walkdir::WalkDir;

const CHECKPOINT_CHUNK_SIZE: usize = 10_000;

pub struct TrainSampler {
    model: Model,
    documents: Vec<Document>,
    num_topics: usize,
    topic_prior: f64,
    word_prior: f64,
    word_prior_sum: f64,

    smoothing_only_bucket: Vec<f64>,
    smoothing_only_sum: f64,
    doc_topic_bucket: Vec<f64>,
    doc_topic_sum: f64,
    topic_word_bucket: Vec<f64>,
    topic_word_sum: f64,
    topic_word_coef: Vec<f64>,
}

impl TrainSampler {
    pub fn new(num_topics: usize, vocab_size: usize, hyper_params: HyperParams) -> Result<Self, TrainError> {
        if num_topics == 0 {
            return Err(TrainError::InvalidTopicCount);
        }
        let word_prior_sum = hyper_params.word_prior * vocab_size as f64;
        Ok(Self {
            model: Model::new(num_topics, vocab_size, hyper_params),
            documents: Vec::new(),
            num_topics,
            topic_prior: hyper_params.topic_prior,
            word_prior: hyper_params.word_prior,
            word_prior_sum,
            smoothing_only_bucket: vec![0.0; num_topics],
            smoothing_only_sum: 0.0,
            doc_topic_bucket: vec![0.0; num_topics],
            doc_topic_sum: 0.0,
            topic_word_bucket: vec![0.0; num_topics],
            topic_word_sum: 0.0,
            topic_word_coef: vec![0.0; num_topics],
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    /// Walks `corpus_dir`, tokenizing each line on tabs, dropping any
    /// document with fewer than 2 in-vocabulary tokens, and seeding every
    /// surviving token with a random initial topic.
    pub fn load_corpus(
        &mut self,
        corpus_dir: impl AsRef<Path>,
        vocabulary: &Vocabulary,
        rng: &mut impl Rng,
    ) -> Result<(), TrainError> {
        let mut dropped = 0usize;
        for entry in WalkDir::new(corpus_dir.as_ref())
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let content = std::fs::read_to_string(entry.path())?;
            for line in content.lines() {
                let tokens: Vec<String> = line
                    .split('\t')
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect();
                if tokens.is_empty() {
                    continue;
                }
                let doc = Document::parse_from_tokens(&tokens, rng, vocabulary, None, self.num_topics);
                if doc.num_words() < 2 {
                    dropped += 1;
                    continue;
                }
                for word in doc.get_words() {
                    self.model.add_word_topic(word.id, word.topic);
                }
                self.documents.push(doc);
            }
        }
        if dropped > 0 {
            log::debug!("dropped {dropped} documents with fewer than 2 in-vocabulary tokens");
        }
        self.compute_smoothing_only_bucket();
        Ok(())
    }

    /// Runs `iterations` full sweeps of the collapsed Gibbs sampler over
    /// every loaded document.
    pub fn gibbs_sampling(&mut self, rng: &mut impl Rng, iterations: usize) -> Result<(), TrainError> {
        if self.num_topics == 0 {
            return Err(TrainError::InvalidTopicCount);
        }
        for _ in 0..iterations {
            let mut fallthrough_warned = false;
            for doc_index in 0..self.documents.len() {
                self.begin_document(doc_index);
                let num_words = self.documents[doc_index].num_words();
                for w in 0..num_words {
                    let (word_id, old_topic) = {
                        let word = self.documents[doc_index].get_words()[w];
                        (word.id, word.topic)
                    };
                    self.remove_word_topic(doc_index, word_id, old_topic);
                    self.compute_topic_word_bucket(word_id);
                    let new_topic =
                        self.sample_new_topic(doc_index, word_id, rng, &mut fallthrough_warned);
                    self.add_word_topic(doc_index, word_id, new_topic);
                    self.documents[doc_index].get_words_mut()[w].topic = new_topic;
                }
            }
        }
        Ok(())
    }

    pub fn save_model(&self, model_dir: impl AsRef<Path>) -> Result<(), TrainError> {
        self.model.save(model_dir)?;
        Ok(())
    }

    /// Saves the model plus the full document state under
    /// `checkpoint_dir/<iteration>/`, chunking documents at
    /// [`CHECKPOINT_CHUNK_SIZE`] per file so no single file grows unbounded.
    pub fn save_checkpoint(
        &self,
        checkpoint_dir: impl AsRef<Path>,
        iteration: usize,
    ) -> Result<(), TrainError> {
        let dir = checkpoint_dir.as_ref().join(iteration.to_string());
        self.model.save(&dir)?;

        let corpus_dir = dir.join("corpus");
        std::fs::create_dir_all(&corpus_dir)?;
        for (chunk_idx, chunk) in self.documents.chunks(CHECKPOINT_CHUNK_SIZE).enumerate() {
            let path = corpus_dir.join(format!("documents.{chunk_idx}"));
            let mut writer = RecordWriter::new(BufWriter::new(std::fs::File::create(path)?));
            for doc in chunk {
                writer.write(&doc.serialize())?;
            }
        }
        Ok(())
    }

    /// Restores model and document state from the highest-numbered
    /// subdirectory of `checkpoint_dir`, returning that iteration number.
    pub fn load_checkpoint(
        &mut self,
        checkpoint_dir: impl AsRef<Path>,
        vocab_size: usize,
    ) -> Result<usize, TrainError> {
        let checkpoint_dir = checkpoint_dir.as_ref();
        let mut best: Option<usize> = None;
        for entry in std::fs::read_dir(checkpoint_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(n) = entry.file_name().to_str().and_then(|s| s.parse::<usize>().ok()) {
                if best.map_or(true, |b| n > b) {
                    best = Some(n);
                }
            }
        }
        let iteration = best
            .ok_or_else(|| TrainError::NoCheckpointFound(checkpoint_dir.to_path_buf()))?;
        let dir = checkpoint_dir.join(iteration.to_string());

        self.model = Model::load(&dir, vocab_size)?;
        self.num_topics = self.model.num_topics();
        self.smoothing_only_bucket = vec![0.0; self.num_topics];
        self.doc_topic_bucket = vec![0.0; self.num_topics];
        self.topic_word_bucket = vec![0.0; self.num_topics];
        self.topic_word_coef = vec![0.0; self.num_topics];

        self.documents.clear();
        let corpus_dir = dir.join("corpus");
        let mut chunk_paths: Vec<_> = std::fs::read_dir(&corpus_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();
        chunk_paths.sort();
        for path in chunk_paths {
            let mut reader = RecordReader::new(std::fs::File::open(&path)?);
            while let Some(blob) = reader.read()? {
                let doc = Document::parse(self.num_topics, &blob).ok_or_else(|| {
                    TrainError::Model(crate::error::ModelError::MalformedWordTopicHistogram(
                        blob.len(),
                    ))
                })?;
                self.documents.push(doc);
            }
        }
        self.compute_smoothing_only_bucket();
        Ok(iteration)
    }

    fn compute_smoothing_only_bucket(&mut self) {
        self.smoothing_only_sum = 0.0;
        for z in 0..self.num_topics {
            let n_z = self.model.global_topic_count(z) as f64;
            let val = self.topic_prior * self.word_prior / (self.word_prior_sum + n_z);
            self.smoothing_only_bucket[z] = val;
            self.smoothing_only_sum += val;
        }
    }

    /// Resets `doc_topic_bucket`/`topic_word_coef` for the document at the
    /// start of processing it.
    fn begin_document(&mut self, doc_index: usize) {
        let entries: Vec<NonZero> = self.documents[doc_index].doc_topic_hist().iter().collect();

        self.doc_topic_sum = 0.0;
        for b in self.doc_topic_bucket.iter_mut() {
            *b = 0.0;
        }
        for z in 0..self.num_topics {
            let n_z = self.model.global_topic_count(z) as f64;
            self.topic_word_coef[z] = self.topic_prior / (self.word_prior_sum + n_z);
        }
        for nz in entries {
            let n_z = self.model.global_topic_count(nz.topic) as f64;
            let denom = self.word_prior_sum + n_z;
            let r = nz.count as f64 * self.word_prior / denom;
            self.doc_topic_bucket[nz.topic] = r;
            self.doc_topic_sum += r;
            self.topic_word_coef[nz.topic] = (self.topic_prior + nz.count as f64) / denom;
        }
    }

    fn compute_topic_word_bucket(&mut self, word_id: WordId) {
        for b in self.topic_word_bucket.iter_mut() {
            *b = 0.0;
        }
        self.topic_word_sum = 0.0;
        let entries: Vec<NonZero> = self.model.word_topic_hist(word_id).iter().collect();
        for nz in entries {
            let val = nz.count as f64 * self.topic_word_coef[nz.topic];
            self.topic_word_bucket[nz.topic] = val;
            self.topic_word_sum += val;
        }
    }

    fn remove_word_topic(&mut self, doc_index: usize, word_id: WordId, topic: usize) {
        self.model.remove_word_topic(word_id, topic);
        self.documents[doc_index].decrease_topic(topic);
        self.refresh_topic(doc_index, topic);
    }

    fn add_word_topic(&mut self, doc_index: usize, word_id: WordId, topic: usize) {
        self.model.add_word_topic(word_id, topic);
        self.documents[doc_index].increase_topic(topic);
        self.refresh_topic(doc_index, topic);
    }

    /// Recomputes the per-topic entries of all three buckets after `N(z)`
    /// or `N(z|d)` changed for `topic`, by subtracting the stale
    /// contribution and adding back the fresh one.
    fn refresh_topic(&mut self, doc_index: usize, topic: usize) {
        let n_z = self.model.global_topic_count(topic) as f64;
        let denom = self.word_prior_sum + n_z;

        let new_s = self.topic_prior * self.word_prior / denom;
        self.smoothing_only_sum -= self.smoothing_only_bucket[topic];
        self.smoothing_only_bucket[topic] = new_s;
        self.smoothing_only_sum += new_s;

        let count = self.documents[doc_index].get_topic_count(topic) as f64;
        let new_r = if count > 0.0 {
            count * self.word_prior / denom
        } else {
            0.0
        };
        self.doc_topic_sum -= self.doc_topic_bucket[topic];
        self.doc_topic_bucket[topic] = new_r;
        self.doc_topic_sum += new_r;

        self.topic_word_coef[topic] = (self.topic_prior + count) / denom;
    }

    /// Draws a new topic for `word_id` by scanning the topic-word bucket
    /// first, then the document-topic bucket, falling back to the dense
    /// smoothing-only bucket. Clamps to the last topic (logging once per
    /// iteration) if rounding error exhausts every bucket before a draw
    /// lands.
    fn sample_new_topic(
        &mut self,
        doc_index: usize,
        word_id: WordId,
        rng: &mut impl Rng,
        fallthrough_warned: &mut bool,
    ) -> usize {
        let total = self.smoothing_only_sum + self.doc_topic_sum + self.topic_word_sum;
        let mut u = rng.gen::<f64>() * total;

        if u < self.topic_word_sum {
            let entries: Vec<NonZero> = self.model.word_topic_hist(word_id).iter().collect();
            for nz in entries {
                let val = self.topic_word_bucket[nz.topic];
                if u < val {
                    return nz.topic;
                }
                u -= val;
            }
            self.clamp_fallthrough(fallthrough_warned)
        } else if u - self.topic_word_sum < self.doc_topic_sum {
            u -= self.topic_word_sum;
            let entries: Vec<NonZero> = self.documents[doc_index].doc_topic_hist().iter().collect();
            for nz in entries {
                let val = self.doc_topic_bucket[nz.topic];
                if u < val {
                    return nz.topic;
                }
                u -= val;
            }
            self.clamp_fallthrough(fallthrough_warned)
        } else {
            u -= self.topic_word_sum + self.doc_topic_sum;
            for z in 0..self.num_topics {
                let val = self.smoothing_only_bucket[z];
                if u < val {
                    return z;
                }
                u -= val;
            }
            self.clamp_fallthrough(fallthrough_warned)
        }
    }

    /// Logs once per iteration (via `fallthrough_warned`) and clamps to the
    /// last topic when rounding error exhausts a bucket scan before a draw
    /// lands.
    fn clamp_fallthrough(&self, fallthrough_warned: &mut bool) -> usize {
        if !*fallthrough_warned {
            log::warn!("sampler fell through all buckets, clamping to the last topic");
            *fallthrough_warned = true;
        }
        self.num_topics - 1
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn toy_vocab() -> Vocabulary {
        let mut vocab = Vocabulary::new();
        for token in ["alpha", "beta", "gamma", "delta", "epsilon"] {
            vocab.add(token);
        }
        vocab
    }

    #[test]
    fn gibbs_sampling_preserves_count_consistency() {
        let vocab = toy_vocab();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut sampler =
            TrainSampler::new(4, vocab.size(), HyperParams::default()).unwrap();

        let corpus_dir = std::env::temp_dir().join(format!(
            "sparselda-train-test-{:?}",
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&corpus_dir).unwrap();
        std::fs::write(
            corpus_dir.join("docs.txt"),
            "alpha\tbeta\tgamma\tdelta\nbeta\tgamma\tepsilon\talpha\tdelta\ngamma\tdelta\tepsilon\n",
        )
        .unwrap();

        sampler.load_corpus(&corpus_dir, &vocab, &mut rng).unwrap();
        std::fs::remove_dir_all(&corpus_dir).ok();

        let total_tokens: usize = sampler.documents().iter().map(Document::num_words).sum();
        sampler.gibbs_sampling(&mut rng, 5).unwrap();

        let global_sum: u32 = (0..sampler.num_topics())
            .map(|z| sampler.model().global_topic_count(z))
            .sum();
        assert_eq!(global_sum as usize, total_tokens);

        for doc in sampler.documents() {
            let doc_sum: u32 = (0..sampler.num_topics()).map(|z| doc.get_topic_count(z)).sum();
            assert_eq!(doc_sum as usize, doc.num_words());
        }

        let mut word_topic_sum = 0u32;
        for word in 0..vocab.size() {
            for z in 0..sampler.num_topics() {
                word_topic_sum += sampler.model().word_topic_count(word, z);
            }
        }
        assert_eq!(word_topic_sum as usize, total_tokens);
    }

    #[test]
    fn rejects_zero_topics() {
        let vocab = toy_vocab();
        assert!(TrainSampler::new(0, vocab.size(), HyperParams::default()).is_err());
    }
}
