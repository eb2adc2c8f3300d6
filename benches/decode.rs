use std::hint::black_box;

use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use tokio_util::codec::Decoder as _;

use flowlog_parser::{
    FieldKind, FlowLogDecoder, FORMAT_VERSION_1, HEADER_LEN, RECORD_MAGIC,
};

fn synthetic_log(records: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for i in 0..records {
        let mask = FieldKind::SrcAddr.mask_bit()
            | FieldKind::DstAddr.mask_bit()
            | FieldKind::SrcPort.mask_bit()
            | FieldKind::DstPort.mask_bit()
            | FieldKind::Protocol.mask_bit()
            | FieldKind::Packets.mask_bit()
            | FieldKind::Octets.mask_bit();
        let mut body = Vec::new();
        body.push(4);
        body.extend_from_slice(&[10, 0, (i >> 8) as u8, i as u8]);
        body.push(4);
        body.extend_from_slice(&[192, 0, 2, 1]);
        body.extend_from_slice(&(i as u16).to_be_bytes());
        body.extend_from_slice(&443u16.to_be_bytes());
        body.push(6);
        body.extend_from_slice(&(i as u64).to_be_bytes());
        body.extend_from_slice(&((i * 1400) as u64).to_be_bytes());

        bytes.extend_from_slice(&RECORD_MAGIC);
        bytes.push(FORMAT_VERSION_1);
        bytes.extend_from_slice(&((HEADER_LEN + body.len()) as u16).to_be_bytes());
        bytes.extend_from_slice(&mask.to_be_bytes());
        bytes.extend_from_slice(&body);
    }
    bytes
}

fn bench_decode(c: &mut Criterion) {
    let bytes = synthetic_log(10_000);

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("ten_thousand_records", |b| {
        b.iter(|| {
            let mut decoder = FlowLogDecoder::default();
            let mut src = BytesMut::from(&bytes[..]);
            let mut records = 0u64;
            while let Ok(Some(outcome)) = decoder.decode(&mut src) {
                black_box(&outcome);
                records += 1;
            }
            records
        })
    });
    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
