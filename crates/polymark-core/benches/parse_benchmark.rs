use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use polymark_core::{Features, ParseOptions, parse};

const SAMPLE: &str = r#"title: Benchmark Document
author: nobody in particular

# Introduction

This paragraph has *emphasis*, **strong text**, `inline code`, a
[reference link][docs], and a bare URL: https://example.com/path.

## Lists

- first item with some content
- second item
  - a nested item
- third item

1. step one
2. step two

## Code

```rust
fn fib(n: u64) -> u64 {
    match n {
        0 => 0,
        1 => 1,
        _ => fib(n - 1) + fib(n - 2),
    }
}
```

## Table

| name  | value |
|:------|------:|
| alpha |     1 |
| beta  |     2 |

> A quote with a footnote reference[^note] and some $x^2$ math.

[docs]: https://example.com/docs "The docs"
[^note]: The footnote body.
    With a continuation line.
"#;

fn bench_parse(c: &mut Criterion) {
    let options = ParseOptions::with_features(
        Features::TABLES
            | Features::FENCED
            | Features::FOOTNOTES
            | Features::AUTOLINK
            | Features::STRIKE
            | Features::SUPER
            | Features::MATH
            | Features::METADATA
            | Features::DEFLIST,
    );

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(SAMPLE.len() as u64));
    group.bench_function("document", |b| {
        b.iter(|| parse(black_box(SAMPLE.as_bytes()), &options))
    });
    group.finish();
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
