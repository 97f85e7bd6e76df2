use criterion::{Criterion, black_box, criterion_group, criterion_main};
use oorandom::Rand32;
use seqlab_core::corpus::parse_corpus;
use seqlab_core::Tagger;

const CORPUS: &str = "EU\tB-ORG\nrejects\tO\nGerman\tB-MISC\ncall\tO\nto\tO\nboycott\tO\nBritish\tB-MISC\nlamb\tO\n.\tO\n\n\
Peter\tB-PER\nBlackburn\tI-PER\n\n\
BRUSSELS\tB-LOC\n1996-08-22\tO\n\n\
The\tO\nEuropean\tB-ORG\nCommission\tI-ORG\nsaid\tO\non\tO\nThursday\tO\nit\tO\ndisagreed\tO\n.\tO\n";

fn trained_tagger() -> Tagger {
    let corpus = parse_corpus(CORPUS).unwrap();
    let mut tagger = Tagger::new(corpus.labels());
    let mut rng = Rand32::new(1);
    for _ in 0..10 {
        for sentence in &corpus {
            tagger
                .update(&sentence.tokens, &sentence.tags, 0.1, &mut rng)
                .unwrap();
        }
    }
    tagger.finish_training();
    tagger
}

fn bench_tagger(c: &mut Criterion) {
    let tagger = trained_tagger();
    let sentence: Vec<String> = "The European Commission said Peter Blackburn visited BRUSSELS on Thursday ."
        .split_whitespace()
        .map(str::to_string)
        .collect();

    c.bench_function("tagger_predict_sentence", |b| {
        b.iter(|| tagger.predict(black_box(&sentence)).unwrap());
    });

    c.bench_function("tagger_tag_text", |b| {
        b.iter(|| {
            tagger
                .tag_text(black_box("German officials met the European Commission in Brussels."))
                .unwrap()
        });
    });

    let corpus = parse_corpus(CORPUS).unwrap();
    c.bench_function("tagger_update_epoch", |b| {
        let mut tagger = Tagger::new(corpus.labels());
        let mut rng = Rand32::new(2);
        b.iter(|| {
            for sentence in &corpus {
                tagger
                    .update(&sentence.tokens, &sentence.tags, 0.0, &mut rng)
                    .unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_tagger);
criterion_main!(benches);
