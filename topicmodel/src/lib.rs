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

//! SparseLDA: a collapsed Gibbs sampler for Latent Dirichlet Allocation,
//! following the bucketed decomposition of Yao, Mimno & McCallum (2009).

pub mod document;
pub mod error;
pub mod histogram;
pub mod infer_sampler;
pub mod model;
pub mod multi_chain;
pub mod recordio;
pub mod train_sampler;
pub mod vocabulary;
