use criterion::{criterion_group, criterion_main, Criterion};
use docsearch_core::{documenter, BuildConfig, DocumentStore, InvertedIndex, SearchOptions, Snapshot, Tokenizer};

const SAMPLE: &str = r##"var documenterSearchIndex = {"docs":
[{"location":"","page":"Home","title":"Home","text":"Documentation for MParT.","category":"page"},
{"location":"#MParT.ComposedMap","page":"Home","title":"MParT.ComposedMap","text":"`ComposedMap(maps::Vector)` Creates a ComposedMap from a vector of ConditionalMapBase objects.","category":"method"},
{"location":"#MParT.MapOptions","page":"Home","title":"MParT.MapOptions","text":"Takes the fields from MParT's MapOptions as keyword arguments, and assigns the field value based on a String from the kwarg value","category":"method"},
{"location":"#MParT.TrainOptions","page":"Home","title":"MParT.TrainOptions","text":"Takes the fields from MParT's TrainOptions as keyword arguments, and assigns the field value based on a String from the kwarg value","category":"method"}]
}"##;

fn bench_tokenize(c: &mut Criterion) {
    let tokenizer = Tokenizer::default();
    c.bench_function("tokenize_sample", |b| b.iter(|| tokenizer.tokenize(SAMPLE).count()));
}

fn bench_search(c: &mut Criterion) {
    let mut store = DocumentStore::new();
    documenter::load_into(&mut store, documenter::parse(SAMPLE).expect("sample parses")).expect("unique locations");
    let index = InvertedIndex::build_from_store(&store, &Tokenizer::default(), &BuildConfig::default()).expect("build");
    let snapshot = Snapshot::new(index, store);
    let options = SearchOptions::default();
    c.bench_function("search_keyword_arguments", |b| b.iter(|| snapshot.search("keyword arguments", &options)));
}

criterion_group!(benches, bench_tokenize, bench_search);
criterion_main!(benches);
