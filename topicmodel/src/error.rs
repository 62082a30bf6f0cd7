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

//! Crate-wide error types.
//!
//! Follows the teacher's `ReadError`/`WriteError` split
//! (`model/classic_serialisation.rs`): one enum per failure surface,
//! `thiserror`-derived, with `#[from]` conversions for the underlying I/O
//! and record-framing errors. Invariant violations are deliberately *not*
//! represented here — those are `panic!`s, not `Result`s.

use crate::recordio::RecordIoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Record(#[from] RecordIoError),
    #[error("global topic histogram record has {0} bytes, not a multiple of 4")]
    MalformedGlobalHistogram(usize),
    #[error("word-topic histogram record has {0} bytes, too short for a word id")]
    MalformedWordTopicHistogram(usize),
    #[error("sparse topic histogram blob has {0} bytes, not a multiple of 8")]
    MalformedSparseHistogram(usize),
    #[error("hyper-params record has {0} bytes, expected 16")]
    MalformedHyperParams(usize),
    #[error("model directory {0:?} has no {1} file")]
    MissingArtifact(std::path::PathBuf, &'static str),
}

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Record(#[from] RecordIoError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),
    #[error("num_topics must be positive, got 0")]
    InvalidTopicCount,
    #[error("checkpoint directory {0:?} contains no numbered subdirectories")]
    NoCheckpointFound(std::path::PathBuf),
}
