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

//! A tokenized document: a sequence of `(word, topic)` assignments plus the
//! running `doc_topic_hist` over those assignments.
//!
//! Grounded on `common/document.py`.

use crate::histogram::OrderedSparseHistogram;
use crate::model::Model;
use crate::vocabulary::{Vocabulary, WordId};
use rand::Rng;

pub type TopicId = usize;

/// A single token's word identity and current topic assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word {
    pub id: WordId,
    pub topic: TopicId,
}

#[derive(Debug, Clone)]
pub struct Document {
    words: Vec<Word>,
    doc_topic_hist: OrderedSparseHistogram,
}

impl Document {
    pub fn new(num_topics: usize) -> Self {
        Self {
            words: Vec::new(),
            doc_topic_hist: OrderedSparseHistogram::new(num_topics),
        }
    }

    /// Builds a document from raw tokens, dropping any token absent from
    /// `vocabulary` and, if `model` is given, any word the model has never
    /// seen during training. Each surviving token gets a uniformly random
    /// initial topic.
    pub fn parse_from_tokens(
        tokens: &[String],
        rng: &mut impl Rng,
        vocabulary: &Vocabulary,
        model: Option<&Model>,
        num_topics: usize,
    ) -> Self {
        let mut doc = Self::new(num_topics);
        for token in tokens {
            let Some(word_id) = vocabulary.word_index(token) else {
                continue;
            };
            if let Some(model) = model {
                if !model.has_word(word_id) {
                    continue;
                }
            }
            let topic = rng.gen_range(0..num_topics);
            doc.push_word(word_id, topic);
        }
        doc
    }

    fn push_word(&mut self, id: WordId, topic: TopicId) {
        self.words.push(Word { id, topic });
        self.doc_topic_hist.increase(topic, 1);
    }

    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    pub fn get_words(&self) -> &[Word] {
        &self.words
    }

    pub fn get_words_mut(&mut self) -> &mut [Word] {
        &mut self.words
    }

    pub fn get_topic_count(&self, topic: TopicId) -> u32 {
        self.doc_topic_hist.count(topic)
    }

    pub fn doc_topic_hist(&self) -> &OrderedSparseHistogram {
        &self.doc_topic_hist
    }

    pub fn increase_topic(&mut self, topic: TopicId) {
        self.doc_topic_hist.increase(topic, 1);
    }

    pub fn decrease_topic(&mut self, topic: TopicId) {
        self.doc_topic_hist.decrease(topic, 1);
    }

    /// Flat encoding: `(u32 id, u32 topic)` pairs, matching the `{id,
    /// topic}` sequence of the persisted format (the enclosing RecordIO
    /// record's length implies the pair count).
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.words.len() * 8);
        for word in &self.words {
            out.extend_from_slice(&(word.id as u32).to_be_bytes());
            out.extend_from_slice(&(word.topic as u32).to_be_bytes());
        }
        out
    }

    pub fn parse(num_topics: usize, blob: &[u8]) -> Option<Self> {
        if blob.len() % 8 != 0 {
            return None;
        }
        let count = blob.len() / 8;
        let mut doc = Self::new(num_topics);
        for i in 0..count {
            let base = i * 8;
            let id = u32::from_be_bytes(blob[base..base + 4].try_into().ok()?) as usize;
            let topic = u32::from_be_bytes(blob[base + 4..base + 8].try_into().ok()?) as usize;
            doc.push_word(id, topic);
        }
        Some(doc)
    }
}
