//! CLI driver for training and applying SparseLDA topic models.
//!
//! Flag naming follows the trainer-CLI convention of `finalfrontier`'s
//! `app.rs`: long flags only, "parse or die" on bad input via [`OrExit`].

use clap::{Args, Parser, Subcommand};
use sparselda_topicmodel::model::{HyperParams, Model, DEFAULT_TOPIC_PRIOR, DEFAULT_WORD_PRIOR};
use sparselda_topicmodel::multi_chain::MultiChain;
use sparselda_topicmodel::train_sampler::TrainSampler;
use sparselda_topicmodel::vocabulary::Vocabulary;
use std::fmt::Display;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "trainer", about = "Train and apply SparseLDA topic models")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a model from a tokenized corpus.
    Train(TrainArgs),
    /// Infer a topic distribution for a list of tokens against a trained model.
    Infer(InferArgs),
}

#[derive(Args)]
struct TrainArgs {
    #[arg(long)]
    corpus_dir: PathBuf,
    #[arg(long)]
    vocabulary_file: PathBuf,
    #[arg(long)]
    num_topics: usize,
    #[arg(long, default_value_t = DEFAULT_TOPIC_PRIOR)]
    topic_prior: f64,
    #[arg(long, default_value_t = DEFAULT_WORD_PRIOR)]
    word_prior: f64,
    #[arg(long)]
    total_iterations: usize,
    #[arg(long)]
    model_dir: PathBuf,
    #[arg(long)]
    save_model_interval: Option<usize>,
    #[arg(long)]
    save_checkpoint_interval: Option<usize>,
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,
    #[arg(long)]
    compute_loglikelihood_interval: Option<usize>,
}

#[derive(Args)]
struct InferArgs {
    #[arg(long)]
    model_dir: PathBuf,
    #[arg(long)]
    vocabulary_file: PathBuf,
    #[arg(long, num_args = 0.., value_delimiter = ' ')]
    tokens: Vec<String>,
    #[arg(long, default_value_t = 4)]
    num_chains: usize,
    #[arg(long, default_value_t = 100)]
    total_iterations: usize,
    #[arg(long, default_value_t = 20)]
    burn_in_iterations: usize,
}

/// "Parse or die": logs and exits with status 1 instead of unwinding.
trait OrExit<T> {
    fn or_exit(self, context: &str) -> T;
}

impl<T, E: Display> OrExit<T> for Result<T, E> {
    fn or_exit(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                log::error!("{context}: {err}");
                std::process::exit(1);
            }
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => run_train(args),
        Command::Infer(args) => run_infer(args),
    }
}

fn run_train(args: TrainArgs) {
    if args.num_topics == 0 {
        log::error!("--num-topics must be positive, got 0");
        std::process::exit(1);
    }
    if let Some(interval) = args.compute_loglikelihood_interval {
        let _ = interval;
        log::debug!(
            "--compute-loglikelihood-interval is accepted for CLI compatibility; \
             log-likelihood computation is out of scope and will not run"
        );
    }

    let vocabulary = Vocabulary::load(&args.vocabulary_file).or_exit("failed to load vocabulary");
    let hyper_params = HyperParams {
        topic_prior: args.topic_prior,
        word_prior: args.word_prior,
    };
    let mut sampler = TrainSampler::new(args.num_topics, vocabulary.size(), hyper_params)
        .or_exit("failed to initialize sampler");
    let mut rng = rand::thread_rng();
    sampler
        .load_corpus(&args.corpus_dir, &vocabulary, &mut rng)
        .or_exit("failed to load corpus");
    log::info!(
        "loaded {} documents over a {}-word vocabulary",
        sampler.documents().len(),
        vocabulary.size()
    );

    let save_model_interval = args.save_model_interval.unwrap_or(args.total_iterations);

    for iteration in 1..=args.total_iterations {
        sampler
            .gibbs_sampling(&mut rng, 1)
            .or_exit("sampling failed");

        if iteration % save_model_interval == 0 || iteration == args.total_iterations {
            sampler
                .save_model(&args.model_dir)
                .or_exit("failed to save model");
            log::info!("saved model at iteration {iteration}");
        }

        if let (Some(interval), Some(checkpoint_dir)) =
            (args.save_checkpoint_interval, &args.checkpoint_dir)
        {
            if iteration % interval == 0 {
                sampler
                    .save_checkpoint(checkpoint_dir, iteration)
                    .or_exit("failed to save checkpoint");
                log::info!("saved checkpoint at iteration {iteration}");
            }
        }
    }
}

fn run_infer(args: InferArgs) {
    let vocabulary = Vocabulary::load(&args.vocabulary_file).or_exit("failed to load vocabulary");
    let model =
        Model::load(&args.model_dir, vocabulary.size()).or_exit("failed to load model");
    let multi_chain = MultiChain::new(
        &model,
        vocabulary.size(),
        args.total_iterations,
        args.burn_in_iterations,
        args.num_chains,
    );
    let distribution = multi_chain.infer_topics(&args.tokens, &vocabulary, &model);
    if distribution.is_empty() {
        log::warn!("no token in the input survived vocabulary/model filtering");
    }
    for (topic, p) in distribution {
        println!("{topic}\t{p:.6}");
    }
}
