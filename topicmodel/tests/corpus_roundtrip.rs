//! Checkpoint-resume integration test: train for a while, checkpoint,
//! resume from the checkpoint, and keep training without tripping any
//! count-consistency invariant.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sparselda_topicmodel::document::Document;
use sparselda_topicmodel::model::HyperParams;
use sparselda_topicmodel::train_sampler::TrainSampler;
use sparselda_topicmodel::vocabulary::Vocabulary;

fn write_corpus(dir: &std::path::Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("shard-0.txt"),
        "the\tquick\tbrown\tfox\tjumps\tover\tthe\tlazy\tdog\n\
         pack\tmy\tbox\twith\tfive\tdozen\tliquor\tjugs\n\
         the\tfive\tboxing\twizards\tjump\tquickly\n\
         sphinx\tof\tblack\tquartz\tjudge\tmy\tvow\n",
    )
    .unwrap();
}

fn total_assigned_tokens(sampler: &TrainSampler) -> usize {
    (0..sampler.num_topics())
        .map(|z| sampler.model().global_topic_count(z) as usize)
        .sum()
}

#[test]
fn checkpoint_resume_preserves_counts_and_continues_training() {
    let root = std::env::temp_dir().join(format!(
        "sparselda-corpus-roundtrip-{:?}",
        std::thread::current().id()
    ));
    let corpus_dir = root.join("corpus");
    let checkpoint_dir = root.join("checkpoints");
    write_corpus(&corpus_dir);

    let mut vocab = Vocabulary::new();
    for token in [
        "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "pack", "my", "box",
        "with", "five", "dozen", "liquor", "jugs", "boxing", "wizards", "jump", "quickly",
        "sphinx", "of", "black", "quartz", "judge", "vow",
    ] {
        vocab.add(token);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(1234);
    let mut sampler = TrainSampler::new(5, vocab.size(), HyperParams::default()).unwrap();
    sampler.load_corpus(&corpus_dir, &vocab, &mut rng).unwrap();

    for iteration in 1..=100 {
        sampler.gibbs_sampling(&mut rng, 1).unwrap();
        if iteration % 10 == 0 {
            sampler.save_checkpoint(&checkpoint_dir, iteration).unwrap();
        }
    }

    let tokens_before = total_assigned_tokens(&sampler);
    let docs_before: Vec<Vec<_>> = sampler
        .documents()
        .iter()
        .map(|d| d.get_words().to_vec())
        .collect();

    let mut resumed = TrainSampler::new(5, vocab.size(), HyperParams::default()).unwrap();
    let restored_iteration = resumed
        .load_checkpoint(&checkpoint_dir, vocab.size())
        .unwrap();
    assert_eq!(restored_iteration, 100);
    assert_eq!(resumed.documents().len(), sampler.documents().len());
    assert_eq!(total_assigned_tokens(&resumed), tokens_before);
    let docs_after: Vec<Vec<_>> = resumed
        .documents()
        .iter()
        .map(|d: &Document| d.get_words().to_vec())
        .collect();
    assert_eq!(docs_after, docs_before);

    let mut rng2 = ChaCha8Rng::seed_from_u64(5678);
    for iteration in 101..=200 {
        resumed.gibbs_sampling(&mut rng2, 1).unwrap();
        let _ = iteration;
    }
    assert_eq!(total_assigned_tokens(&resumed), tokens_before);
    for doc in resumed.documents() {
        let doc_sum: u32 = (0..resumed.num_topics()).map(|z| doc.get_topic_count(z)).sum();
        assert_eq!(doc_sum as usize, doc.num_words());
    }

    std::fs::remove_dir_all(&root).ok();
}
