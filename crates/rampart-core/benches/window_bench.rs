use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rampart_core::sequence::SequenceBuffer;
use rampart_core::stream::{BitReader, BitWriter};

fn bench_sequence_buffer(c: &mut Criterion) {
    c.bench_function("sequence_buffer_insert_find", |b| {
        let mut buffer: SequenceBuffer<u64> = SequenceBuffer::new(256);
        let mut sequence: u16 = 0;
        b.iter(|| {
            *buffer.insert(sequence).unwrap() = u64::from(sequence);
            black_box(buffer.find(sequence.wrapping_sub(128)));
            sequence = sequence.wrapping_add(1);
        });
    });

    c.bench_function("ack_bits_scan", |b| {
        let mut buffer: SequenceBuffer<()> = SequenceBuffer::new(256);
        for seq in 0..1000u16 {
            if seq % 3 != 0 {
                buffer.insert(seq);
            }
        }
        b.iter(|| {
            let ack = buffer.sequence().wrapping_sub(1);
            let mut bits = 0u32;
            for i in 0..32u16 {
                if buffer.exists(ack.wrapping_sub(i)) {
                    bits |= 1 << i;
                }
            }
            black_box(bits)
        });
    });
}

fn bench_bit_packing(c: &mut Criterion) {
    c.bench_function("bit_writer_reader_64_values", |b| {
        b.iter(|| {
            let mut writer = BitWriter::new();
            for i in 0..64u32 {
                writer.write_bits(i, 1 + (i % 31));
            }
            let bytes = writer.finish();
            let mut reader = BitReader::new(&bytes);
            for i in 0..64u32 {
                black_box(reader.read_bits(1 + (i % 31)).unwrap());
            }
        });
    });
}

criterion_group!(benches, bench_sequence_buffer, bench_bit_packing);
criterion_main!(benches);
