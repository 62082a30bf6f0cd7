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

//! The trained model: global and per-word topic histograms plus the
//! Dirichlet hyperparameters, with RecordIO-backed persistence.
//!
//! Grounded on `common/model.py`. The trainer's defaults (`α = 0.1`,
//! `β = 0.01`) are authoritative, matching `Model.__init__` rather than the
//! contradicting `HyperParams.__init__` defaults in the same file.

use crate::error::ModelError;
use crate::histogram::OrderedSparseHistogram;
use crate::recordio::{RecordReader, RecordWriter};
use crate::vocabulary::WordId;
use rayon::prelude::*;
use std::io::BufWriter;
use std::path::Path;

pub const DEFAULT_TOPIC_PRIOR: f64 = 0.1;
pub const DEFAULT_WORD_PRIOR: f64 = 0.01;

const GLOBAL_TOPIC_HIST_FILE: &str = "lda.global_topic_hist";
const WORD_TOPIC_HIST_FILE: &str = "lda.word_topic_hist";
const HYPER_PARAMS_FILE: &str = "lda.hyper_params";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HyperParams {
    pub topic_prior: f64,
    pub word_prior: f64,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            topic_prior: DEFAULT_TOPIC_PRIOR,
            word_prior: DEFAULT_WORD_PRIOR,
        }
    }
}

/// `p(w|z)` for a single word, one entry per topic.
pub type WordTopicDist = Vec<f64>;

#[derive(Debug, Clone)]
pub struct Model {
    num_topics: usize,
    hyper_params: HyperParams,
    global_topic_hist: Vec<u32>,
    word_topic_hist: Vec<OrderedSparseHistogram>,
}

impl Model {
    pub fn new(num_topics: usize, vocab_size: usize, hyper_params: HyperParams) -> Self {
        Self {
            num_topics,
            hyper_params,
            global_topic_hist: vec![0; num_topics],
            word_topic_hist: vec![OrderedSparseHistogram::new(num_topics); vocab_size],
        }
    }

    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    pub fn hyper_params(&self) -> HyperParams {
        self.hyper_params
    }

    pub fn vocab_size(&self) -> usize {
        self.word_topic_hist.len()
    }

    /// True if `word` was assigned at least one token during training.
    /// Matches the Python original's dict-membership check on
    /// `word_topic_hist` (only words seen at training time are keys there).
    pub fn has_word(&self, word: WordId) -> bool {
        self.word_topic_hist
            .get(word)
            .map(|h| !h.is_empty())
            .unwrap_or(false)
    }

    /// `N(z)`, the total number of tokens assigned to `topic` across the
    /// whole corpus.
    pub fn global_topic_count(&self, topic: usize) -> u32 {
        self.global_topic_hist[topic]
    }

    /// `N(w|z)`, the number of tokens of `word` assigned to `topic`.
    pub fn word_topic_count(&self, word: WordId, topic: usize) -> u32 {
        self.word_topic_hist[word].count(topic)
    }

    pub fn word_topic_hist(&self, word: WordId) -> &OrderedSparseHistogram {
        &self.word_topic_hist[word]
    }

    /// Assigns one more token of `word` to `topic`, keeping `N(w|z)` and
    /// `N(z)` consistent.
    pub fn add_word_topic(&mut self, word: WordId, topic: usize) {
        self.word_topic_hist[word].increase(topic, 1);
        self.global_topic_hist[topic] += 1;
    }

    /// Removes one token of `word` from `topic`, keeping `N(w|z)` and `N(z)`
    /// consistent.
    pub fn remove_word_topic(&mut self, word: WordId, topic: usize) {
        self.word_topic_hist[word].decrease(topic, 1);
        self.global_topic_hist[topic] -= 1;
    }

    /// Builds the dense `p(w|z) = (β + N(w|z)) / (β·V + N(z))` cache used by
    /// inference, one row per word in the vocabulary.
    pub fn word_topic_dist(&self, vocab_size: usize) -> Vec<WordTopicDist> {
        let beta = self.hyper_params.word_prior;
        let denom: Vec<f64> = self
            .global_topic_hist
            .iter()
            .map(|&n_z| beta * vocab_size as f64 + n_z as f64)
            .collect();
        (0..vocab_size)
            .into_par_iter()
            .map(|word| {
                let hist = self
                    .word_topic_hist
                    .get(word)
                    .cloned()
                    .unwrap_or_else(|| OrderedSparseHistogram::new(self.num_topics));
                (0..self.num_topics)
                    .map(|topic| (beta + hist.count(topic) as f64) / denom[topic])
                    .collect()
            })
            .collect()
    }

    pub fn save(&self, dir: impl AsRef<Path>) -> Result<(), ModelError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut global_blob = Vec::with_capacity(self.global_topic_hist.len() * 4);
        for &n_z in &self.global_topic_hist {
            global_blob.extend_from_slice(&n_z.to_be_bytes());
        }
        let mut writer = RecordWriter::new(BufWriter::new(std::fs::File::create(
            dir.join(GLOBAL_TOPIC_HIST_FILE),
        )?));
        writer.write(&global_blob)?;

        let mut writer = RecordWriter::new(BufWriter::new(std::fs::File::create(
            dir.join(WORD_TOPIC_HIST_FILE),
        )?));
        for (word, hist) in self.word_topic_hist.iter().enumerate() {
            if hist.is_empty() {
                continue;
            }
            let mut blob = Vec::with_capacity(4);
            blob.extend_from_slice(&(word as u32).to_be_bytes());
            blob.extend_from_slice(&hist.serialize());
            writer.write(&blob)?;
        }

        let mut hyper_blob = Vec::with_capacity(16);
        hyper_blob.extend_from_slice(&self.hyper_params.topic_prior.to_be_bytes());
        hyper_blob.extend_from_slice(&self.hyper_params.word_prior.to_be_bytes());
        let mut writer = RecordWriter::new(BufWriter::new(std::fs::File::create(
            dir.join(HYPER_PARAMS_FILE),
        )?));
        writer.write(&hyper_blob)?;

        Ok(())
    }

    pub fn load(dir: impl AsRef<Path>, vocab_size: usize) -> Result<Self, ModelError> {
        let dir = dir.as_ref();

        let global_path = dir.join(GLOBAL_TOPIC_HIST_FILE);
        if !global_path.exists() {
            return Err(ModelError::MissingArtifact(
                dir.to_path_buf(),
                GLOBAL_TOPIC_HIST_FILE,
            ));
        }
        let mut reader = RecordReader::new(std::fs::File::open(&global_path)?);
        let global_blob = reader.read()?.unwrap_or_default();
        if global_blob.len() % 4 != 0 {
            return Err(ModelError::MalformedGlobalHistogram(global_blob.len()));
        }
        let num_topics = global_blob.len() / 4;
        let global_topic_hist: Vec<u32> = global_blob
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
            .collect();

        let hyper_path = dir.join(HYPER_PARAMS_FILE);
        if !hyper_path.exists() {
            return Err(ModelError::MissingArtifact(
                dir.to_path_buf(),
                HYPER_PARAMS_FILE,
            ));
        }
        let mut reader = RecordReader::new(std::fs::File::open(&hyper_path)?);
        let hyper_blob = reader.read()?.unwrap_or_default();
        if hyper_blob.len() != 16 {
            return Err(ModelError::MalformedHyperParams(hyper_blob.len()));
        }
        let topic_prior = f64::from_be_bytes(hyper_blob[0..8].try_into().unwrap());
        let word_prior = f64::from_be_bytes(hyper_blob[8..16].try_into().unwrap());

        let mut word_topic_hist = vec![OrderedSparseHistogram::new(num_topics); vocab_size];
        let word_topic_path = dir.join(WORD_TOPIC_HIST_FILE);
        if !word_topic_path.exists() {
            return Err(ModelError::MissingArtifact(
                dir.to_path_buf(),
                WORD_TOPIC_HIST_FILE,
            ));
        }
        let mut reader = RecordReader::new(std::fs::File::open(&word_topic_path)?);
        while let Some(blob) = reader.read()? {
            if blob.len() < 4 {
                return Err(ModelError::MalformedWordTopicHistogram(blob.len()));
            }
            let word = u32::from_be_bytes(blob[0..4].try_into().unwrap()) as usize;
            let hist = OrderedSparseHistogram::parse(num_topics, &blob[4..])?;
            if word >= word_topic_hist.len() {
                word_topic_hist.resize(word + 1, OrderedSparseHistogram::new(num_topics));
            }
            word_topic_hist[word] = hist;
        }

        Ok(Self {
            num_topics,
            hyper_params: HyperParams {
                topic_prior,
                word_prior,
            },
            global_topic_hist,
            word_topic_hist,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_and_remove_keep_counts_consistent() {
        let mut model = Model::new(4, 3, HyperParams::default());
        model.add_word_topic(0, 1);
        model.add_word_topic(0, 1);
        model.add_word_topic(1, 2);
        assert_eq!(model.global_topic_count(1), 2);
        assert_eq!(model.global_topic_count(2), 1);
        assert_eq!(model.word_topic_count(0, 1), 2);
        model.remove_word_topic(0, 1);
        assert_eq!(model.global_topic_count(1), 1);
        assert_eq!(model.word_topic_count(0, 1), 1);
    }

    #[test]
    fn word_topic_dist_matches_formula() {
        let mut model = Model::new(2, 2, HyperParams {
            topic_prior: 0.1,
            word_prior: 0.5,
        });
        model.add_word_topic(0, 0);
        model.add_word_topic(0, 0);
        model.add_word_topic(1, 1);
        let dist = model.word_topic_dist(2);
        let expected_w0_t0 = (0.5 + 2.0) / (0.5 * 2.0 + 2.0);
        assert!((dist[0][0] - expected_w0_t0).abs() < 1e-12);
        let expected_w1_t0 = (0.5 + 0.0) / (0.5 * 2.0 + 2.0);
        assert!((dist[1][0] - expected_w1_t0).abs() < 1e-12);
    }

    #[test]
    fn save_and_load_round_trip() {
        let mut model = Model::new(3, 4, HyperParams {
            topic_prior: 0.1,
            word_prior: 0.01,
        });
        model.add_word_topic(0, 2);
        model.add_word_topic(2, 1);
        model.add_word_topic(2, 1);

        let dir = std::env::temp_dir().join(format!(
            "sparselda-model-test-{:?}",
            std::thread::current().id()
        ));
        model.save(&dir).unwrap();
        let loaded = Model::load(&dir, 4).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(loaded.num_topics(), model.num_topics());
        assert_eq!(loaded.hyper_params(), model.hyper_params());
        assert_eq!(loaded.global_topic_count(2), model.global_topic_count(2));
        assert_eq!(loaded.word_topic_count(2, 1), model.word_topic_count(2, 1));
        assert_eq!(loaded.word_topic_count(0, 2), model.word_topic_count(0, 2));
    }
}
