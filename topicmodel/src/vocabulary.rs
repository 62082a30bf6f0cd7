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

//! Token/id lookup, loaded from a flat vocabulary file.
//!
//! One token per line, tab-separated (only the first field is read, so a
//! frequency or other metadata column can follow). Ids are dense and
//! assigned in file order; a token repeated later in the file keeps its
//! first id. Grounded on `common/vocabulary.py`.

use crate::error::VocabularyError;
use indexmap::IndexMap;
use sparselda_toolkit::from_str_ex::ParseEx;
use std::io::BufRead;
use std::path::Path;

pub type WordId = usize;

#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    word_to_id: IndexMap<String, WordId>,
    id_to_word: Vec<String>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `token` if absent, returning its id either way.
    pub fn add(&mut self, token: &str) -> WordId {
        if let Some(&id) = self.word_to_id.get(token) {
            return id;
        }
        let id = self.id_to_word.len();
        self.id_to_word.push(token.to_string());
        self.word_to_id.insert(token.to_string(), id);
        id
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, VocabularyError> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let mut vocab = Self::new();
        for line in reader.lines() {
            let line = line?;
            let mut fields = line.split('\t');
            let token = fields.next().unwrap_or("");
            if token.is_empty() {
                continue;
            }
            if let Some(count_field) = fields.next() {
                if let Err(err) = count_field.parse_ex_tagged::<u64>("vocabulary count") {
                    log::warn!("ignoring malformed count field for {token:?}: {err}");
                }
            }
            vocab.add(token);
        }
        Ok(vocab)
    }

    pub fn has_word(&self, token: &str) -> bool {
        self.word_to_id.contains_key(token)
    }

    pub fn word_index(&self, token: &str) -> Option<WordId> {
        self.word_to_id.get(token).copied()
    }

    pub fn word(&self, id: WordId) -> Option<&str> {
        self.id_to_word.get(id).map(String::as_str)
    }

    pub fn size(&self) -> usize {
        self.id_to_word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_word.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn loads_tab_separated_file_with_dense_ids() {
        let path = write_temp_file("cat\t10\ndog\t5\ncat\t99\nbird\t1\n");
        let vocab = Vocabulary::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(vocab.size(), 3);
        assert_eq!(vocab.word_index("cat"), Some(0));
        assert_eq!(vocab.word_index("dog"), Some(1));
        assert_eq!(vocab.word_index("bird"), Some(2));
        assert_eq!(vocab.word(0), Some("cat"));
        assert!(vocab.has_word("dog"));
        assert!(!vocab.has_word("fish"));
        assert_eq!(vocab.word_index("fish"), None);
    }

    #[test]
    fn tolerates_a_malformed_count_field() {
        let path = write_temp_file("cat\tnot-a-number\ndog\t5\n");
        let vocab = Vocabulary::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(vocab.size(), 2);
        assert_eq!(vocab.word_index("cat"), Some(0));
        assert_eq!(vocab.word_index("dog"), Some(1));
    }

    fn write_temp_file(content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "sparselda-vocab-test-{:?}-{}",
            std::thread::current().id(),
            content.len()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }
}
