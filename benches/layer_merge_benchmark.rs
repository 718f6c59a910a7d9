use criterion::{black_box, criterion_group, criterion_main, Criterion};
use squash::squash::squash_layers;
use std::fs;
use std::path::Path;
use tar::{Builder, Header};
use tempfile::TempDir;

fn write_entry(builder: &mut Builder<fs::File>, name: &str, content: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_path(name).unwrap();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, content).unwrap();
}

/// Lay out `layer_count` Docker-style layer directories under `old_root`,
/// each adding a handful of files of `file_size` bytes, returning the
/// bottom-to-top list of layer ids.
fn build_layers(old_root: &Path, layer_count: usize, files_per_layer: usize, file_size: usize) -> Vec<String> {
    let mut ids = Vec::with_capacity(layer_count);
    let content = vec![0u8; file_size];
    for i in 0..layer_count {
        let digest = format!("{:064x}", i);
        let layer_dir = old_root.join(&digest);
        fs::create_dir_all(&layer_dir).unwrap();
        let tar_file = fs::File::create(layer_dir.join("layer.tar")).unwrap();
        let mut builder = Builder::new(tar_file);
        for f in 0..files_per_layer {
            write_entry(&mut builder, &format!("layer{i}/file{f}"), &content);
        }
        builder.finish().unwrap();
        ids.push(format!("sha256:{digest}"));
    }
    ids
}

fn benchmark_squash_many_small_layers(c: &mut Criterion) {
    let mut group = c.benchmark_group("squash_layer_count");
    for layer_count in [5, 10, 20].iter() {
        group.bench_with_input(
            format!("{layer_count}_layers"),
            layer_count,
            |b, &layer_count| {
                b.iter(|| {
                    let work = TempDir::new().unwrap();
                    let old_root = work.path().join("old");
                    let new_root = work.path().join("new");
                    fs::create_dir_all(&old_root).unwrap();
                    fs::create_dir_all(&new_root).unwrap();
                    let ids = build_layers(&old_root, layer_count, 4, 256);

                    let out = squash_layers(
                        black_box(&ids),
                        black_box(&[]),
                        &old_root,
                        &new_root,
                        false,
                    )
                    .unwrap();
                    black_box(out)
                })
            },
        );
    }
    group.finish();
}

fn benchmark_squash_large_layer_contents(c: &mut Criterion) {
    let mut group = c.benchmark_group("squash_file_size");
    for size_kb in [1, 10, 100].iter() {
        group.bench_with_input(
            format!("{size_kb}kb_files"),
            size_kb,
            |b, &size_kb| {
                b.iter(|| {
                    let work = TempDir::new().unwrap();
                    let old_root = work.path().join("old");
                    let new_root = work.path().join("new");
                    fs::create_dir_all(&old_root).unwrap();
                    fs::create_dir_all(&new_root).unwrap();
                    let ids = build_layers(&old_root, 3, 4, size_kb * 1024);

                    let out = squash_layers(black_box(&ids), black_box(&[]), &old_root, &new_root, false).unwrap();
                    black_box(out)
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_squash_many_small_layers,
    benchmark_squash_large_layer_contents
);
criterion_main!(benches);
