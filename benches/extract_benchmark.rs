//! Extraction throughput on a representative perfume page

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use perfume_import_lib::infrastructure::PerfumePageExtractor;
use perfume_import_lib::test_utils::perfume_page;

fn large_page() -> String {
    let filler: String = (0..400)
        .map(|i| format!("<div class=\"review\"><p>Review {i}: long lasting, <b>fruity</b> opening.</p></div>"))
        .collect();
    format!(
        r#"<html><head><meta property="og:title" content="Aventus"></head><body>
        {filler}
        <img itemprop="image" src="https://fimgs.net/mdimg/perfume-thumbs/375x500.9828.jpg">
        <div itemprop="description"><p>Aventus by Creed is a Chypre Fruity fragrance for men.</p></div>
        </body></html>"#
    )
}

fn extraction(c: &mut Criterion) {
    let extractor = PerfumePageExtractor::new();
    let small = perfume_page(
        "https://fimgs.net/mdimg/perfume-thumbs/375x500.9828.jpg",
        "Aventus by Creed &amp;amp; friends",
    );
    let large = large_page();

    c.bench_function("extract og page", |b| b.iter(|| extractor.extract(black_box(&small))));
    c.bench_function("extract itemprop page with 400 reviews", |b| {
        b.iter(|| extractor.extract(black_box(&large)))
    });
}

criterion_group!(benches, extraction);
criterion_main!(benches);
