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

//! Single-chain inference over a fixed, already-trained model.
//!
//! The trained `p(w|z)` table never changes during inference, so the usual
//! three-bucket decomposition collapses to two: a dense smoothing-only
//! bucket `α·p(w|z)` and a sparse document-topic bucket `N(z|d)·p(w|z)`.
//!
//! Grounded on `inference/sparselda_gibbs_sampler.py`.

use crate::document::Document;
use crate::histogram::NonZero;
use crate::model::{Model, WordTopicDist};
use crate::vocabulary::{Vocabulary, WordId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

pub struct InferSampler {
    word_topic_dist: Vec<WordTopicDist>,
    num_topics: usize,
    topic_prior: f64,
    total_iterations: usize,
    burn_in_iterations: usize,
}

impl InferSampler {
    pub fn new(
        model: &Model,
        vocab_size: usize,
        total_iterations: usize,
        burn_in_iterations: usize,
    ) -> Self {
        Self {
            word_topic_dist: model.word_topic_dist(vocab_size),
            num_topics: model.num_topics(),
            topic_prior: model.hyper_params().topic_prior,
            total_iterations,
            burn_in_iterations,
        }
    }

    pub fn num_topics(&self) -> usize {
        self.num_topics
    }

    /// Infers a topic distribution for `tokens` against `model`, seeding
    /// the chain's RNG deterministically from a hash of the token sequence
    /// so repeated calls on the same input reproduce the same result.
    /// Returns an empty map if no token survives vocabulary/model
    /// filtering.
    pub fn infer_topics(
        &self,
        tokens: &[String],
        vocabulary: &Vocabulary,
        model: &Model,
    ) -> BTreeMap<usize, f64> {
        self.infer_topics_chain(tokens, vocabulary, model, 0)
    }

    /// Like [`Self::infer_topics`], but mixes `chain_id` into the RNG seed
    /// so that sibling chains over the same tokens (see `MultiChain`) don't
    /// retrace an identical sampling path.
    pub fn infer_topics_chain(
        &self,
        tokens: &[String],
        vocabulary: &Vocabulary,
        model: &Model,
        chain_id: u64,
    ) -> BTreeMap<usize, f64> {
        let seed = seed_from_tokens(tokens) ^ chain_id.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut doc = Document::parse_from_tokens(tokens, &mut rng, vocabulary, Some(model), self.num_topics);
        if doc.num_words() == 0 {
            return BTreeMap::new();
        }

        let mut accum = vec![0.0f64; self.num_topics];
        for iteration in 0..self.total_iterations {
            let mut fallthrough_warned = false;
            let num_words = doc.num_words();
            for w in 0..num_words {
                let (word_id, old_topic) = {
                    let word = doc.get_words()[w];
                    (word.id, word.topic)
                };
                doc.decrease_topic(old_topic);
                let new_topic = self.sample_word_topic(&doc, word_id, &mut rng, &mut fallthrough_warned);
                doc.increase_topic(new_topic);
                doc.get_words_mut()[w].topic = new_topic;
            }
            if iteration >= self.burn_in_iterations {
                for z in 0..self.num_topics {
                    accum[z] += doc.get_topic_count(z) as f64;
                }
            }
        }

        l1_normalize(&mut accum);
        accum.into_iter().enumerate().collect()
    }

    fn sample_word_topic(
        &self,
        doc: &Document,
        word_id: WordId,
        rng: &mut impl Rng,
        fallthrough_warned: &mut bool,
    ) -> usize {
        let dist = &self.word_topic_dist[word_id];
        let smoothing_sum: f64 = dist.iter().map(|&p| self.topic_prior * p).sum();
        let doc_entries: Vec<NonZero> = doc.doc_topic_hist().iter().collect();
        let doc_sum: f64 = doc_entries
            .iter()
            .map(|nz| nz.count as f64 * dist[nz.topic])
            .sum();

        let total = smoothing_sum + doc_sum;
        let mut u = rng.gen::<f64>() * total;

        if u < doc_sum {
            for nz in &doc_entries {
                let val = nz.count as f64 * dist[nz.topic];
                if u < val {
                    return nz.topic;
                }
                u -= val;
            }
            self.clamp_fallthrough(fallthrough_warned)
        } else {
            u -= doc_sum;
            for z in 0..self.num_topics {
                let val = self.topic_prior * dist[z];
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
            log::warn!("inference sampler fell through both buckets, clamping to the last topic");
            *fallthrough_warned = true;
        }
        self.num_topics - 1
    }
}

fn seed_from_tokens(tokens: &[String]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    tokens.hash(&mut hasher);
    hasher.finish()
}

pub(crate) fn l1_normalize(values: &mut [f64]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::HyperParams;

    fn trained_model() -> (Model, Vocabulary) {
        let mut vocab = Vocabulary::new();
        for token in ["alpha", "beta", "gamma"] {
            vocab.add(token);
        }
        let mut model = Model::new(3, vocab.size(), HyperParams::default());
        model.add_word_topic(0, 0);
        model.add_word_topic(0, 0);
        model.add_word_topic(1, 1);
        model.add_word_topic(2, 2);
        (model, vocab)
    }

    #[test]
    fn inference_on_empty_input_returns_empty_distribution() {
        let (model, vocab) = trained_model();
        let sampler = InferSampler::new(&model, vocab.size(), 20, 5);
        let result = sampler.infer_topics(&[], &vocab, &model);
        assert!(result.is_empty());
    }

    #[test]
    fn inference_produces_a_normalized_distribution() {
        let (model, vocab) = trained_model();
        let sampler = InferSampler::new(&model, vocab.size(), 30, 10);
        let tokens: Vec<String> = vec!["alpha", "beta", "gamma", "alpha"]
            .into_iter()
            .map(String::from)
            .collect();
        let result = sampler.infer_topics(&tokens, &vocab, &model);
        assert_eq!(result.len(), sampler.num_topics());
        let total: f64 = result.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(result.values().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn inference_drops_unknown_words_entirely() {
        let (model, vocab) = trained_model();
        let sampler = InferSampler::new(&model, vocab.size(), 20, 5);
        let tokens: Vec<String> = vec!["unknown-word"].into_iter().map(String::from).collect();
        let result = sampler.infer_topics(&tokens, &vocab, &model);
        assert!(result.is_empty());
    }
}
