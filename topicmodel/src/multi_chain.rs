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

//! Runs several independent inference chains over the same tokens and
//! averages their topic distributions.
//!
//! The Python original (`inference/multi_chain_gibbs_sampler.py`) runs its
//! chains sequentially off one shared RNG. Chains here are embarrassingly
//! parallel and run with independent per-chain RNG streams instead — there
//! is no correctness reason for one chain's draws to perturb another's, and
//! independent streams let `rayon` fan them out across cores.
//!
//! Grounded on `inference/multi_chain_gibbs_sampler.py`.

use crate::infer_sampler::InferSampler;
use crate::model::Model;
use crate::vocabulary::Vocabulary;
use rayon::prelude::*;
use std::collections::BTreeMap;

pub struct MultiChain {
    sampler: InferSampler,
    num_chains: usize,
}

impl MultiChain {
    pub fn new(
        model: &Model,
        vocab_size: usize,
        total_iterations: usize,
        burn_in_iterations: usize,
        num_chains: usize,
    ) -> Self {
        Self {
            sampler: InferSampler::new(model, vocab_size, total_iterations, burn_in_iterations),
            num_chains,
        }
    }

    pub fn num_chains(&self) -> usize {
        self.num_chains
    }

    /// Runs `num_chains` independent chains over `tokens` and averages the
    /// per-chain distributions. A chain that drops every token (e.g. an
    /// empty or fully out-of-vocabulary document) contributes nothing to
    /// the average rather than pulling it toward zero.
    pub fn infer_topics(
        &self,
        tokens: &[String],
        vocabulary: &Vocabulary,
        model: &Model,
    ) -> BTreeMap<usize, f64> {
        let per_chain: Vec<BTreeMap<usize, f64>> = (0..self.num_chains)
            .into_par_iter()
            .map(|chain_id| {
                self.sampler
                    .infer_topics_chain(tokens, vocabulary, model, chain_id as u64)
            })
            .collect();

        let num_topics = self.sampler.num_topics();
        let mut accum = vec![0.0f64; num_topics];
        let mut contributing = 0usize;
        for chain in &per_chain {
            if chain.is_empty() {
                continue;
            }
            contributing += 1;
            for (&topic, &p) in chain {
                accum[topic] += p;
            }
        }
        if contributing == 0 {
            return BTreeMap::new();
        }
        for v in accum.iter_mut() {
            *v /= contributing as f64;
        }
        accum.into_iter().enumerate().collect()
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
        model.add_word_topic(1, 1);
        model.add_word_topic(2, 2);
        (model, vocab)
    }

    #[test]
    fn averages_across_chains_to_a_normalized_distribution() {
        let (model, vocab) = trained_model();
        let multi_chain = MultiChain::new(&model, vocab.size(), 25, 5, 6);
        let tokens: Vec<String> = vec!["alpha", "beta", "gamma"]
            .into_iter()
            .map(String::from)
            .collect();
        let result = multi_chain.infer_topics(&tokens, &vocab, &model);
        assert_eq!(result.len(), multi_chain.sampler.num_topics());
        let total: f64 = result.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_yields_empty_distribution() {
        let (model, vocab) = trained_model();
        let multi_chain = MultiChain::new(&model, vocab.size(), 25, 5, 4);
        let result = multi_chain.infer_topics(&[], &vocab, &model);
        assert!(result.is_empty());
    }
}
