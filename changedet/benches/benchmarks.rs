use changedet::{BorderFollowing, ContourExtractor, EllipseFilter, Grid, MorphologicalFilter};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// A grid of scattered blocks of varying height.
fn blocks(size: usize) -> Grid {
    Grid::from_fn(size, size, |row, col| {
        let (r, c) = (row / 25, col / 25);
        if (r + c) % 3 == 0 && (row % 25) > 4 && (col % 25) > 4 {
            ((r * 7 + c) % 5 + 1) as f64
        } else {
            0.0
        }
    })
}

fn morphology(c: &mut Criterion) {
    let mut group = c.benchmark_group("Morphology");
    let filter = EllipseFilter::default();

    for size in [100, 250] {
        let grid = blocks(size);
        group.bench_with_input(BenchmarkId::new("open_close", size), &grid, |b, g| {
            b.iter(|| filter.close(&filter.open(g)))
        });
    }
}

fn contours(c: &mut Criterion) {
    let mut group = c.benchmark_group("Contours");
    let grid = blocks(500);
    group.bench_with_input("border_following", &grid, |b, g| {
        b.iter(|| BorderFollowing.external_contours(g))
    });
}

criterion_group!(benches, morphology, contours);
criterion_main!(benches);
