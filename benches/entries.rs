use criterion::{Criterion, criterion_group, criterion_main};
use qa_search::embeddings::l2_normalize;
use qa_search::ingest::build_entries;
use qa_search::records::records_from_rows;
use std::hint::black_box;

const ROWS: usize = 5_000;

fn sheet_rows() -> Vec<Vec<String>> {
    let header = ["chunk_id", "header", "content", "标准问题", "发散问题", "客服答案", "图片"]
        .map(String::from)
        .to_vec();

    let mut rows = vec![header];
    for i in 0..ROWS {
        // Every tenth row repeats an earlier standard question
        let question = if i % 10 == 9 {
            format!("整车保修期是多久？ {}", i - 9)
        } else {
            format!("整车保修期是多久？ {i}")
        };
        rows.push(vec![
            format!("chunk-{i}"),
            "售后服务".to_string(),
            "整车保修期为两年或五万公里，以先到者为准".to_string(),
            question,
            if i % 2 == 0 { format!("保修多久 {i}") } else { "nan".to_string() },
            "两年或五万公里".to_string(),
            String::new(),
        ]);
    }
    rows
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let rows = sheet_rows();
    c.bench_function("records_from_rows", |b| {
        b.iter(|| records_from_rows(black_box("bench.xlsx"), black_box(rows.clone())))
    });

    let records = records_from_rows("bench.xlsx", rows)
        .expect("bench sheet is valid")
        .records;
    c.bench_function("build_entries", |b| {
        b.iter(|| build_entries(black_box(&records)))
    });

    let vector: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.37).sin()).collect();
    c.bench_function("l2_normalize_1024", |b| {
        b.iter(|| {
            let mut v = vector.clone();
            l2_normalize(black_box(&mut v));
            v
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
