#[macro_use]
extern crate criterion;

use criterion::Criterion;

use utkik_core::mailbox::Mailbox;

fn bench_mailbox_submit_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("mailbox_throughput");

    for capacity in [128, 1024, 16384] {
        group.throughput(criterion::Throughput::Elements(capacity as u64)); // Messages per second
        group.bench_function(format!("capacity_{}", capacity), |b| {
            let mailbox = Mailbox::with_capacity(capacity).unwrap();
            b.iter(|| {
                mailbox.submit(0xdead_beef_u64).unwrap();
                mailbox.extract().unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_mailbox_submit_extract);
criterion_main!(benches);
