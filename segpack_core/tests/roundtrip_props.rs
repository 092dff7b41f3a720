use ndarray::Array3;
use proptest::prelude::*;

use segpack_core::bitpack::{pack, unpack};
use segpack_core::{decode_chunk, encode_chunk, ChunkBounds};

fn volume_strategy() -> impl Strategy<Value = (Array3<u32>, [usize; 3])> {
    (1usize..12, 1usize..12, 1usize..12, 1usize..6, 1usize..6, 1usize..6, 1u32..40).prop_flat_map(
        |(z, y, x, bz, by, bx, labels)| {
            proptest::collection::vec(0..labels, z * y * x).prop_map(move |values| {
                let volume = Array3::from_shape_vec((z, y, x), values).unwrap();
                (volume, [bz, by, bx])
            })
        },
    )
}

proptest! {
    #[test]
    fn chunk_round_trip((volume, block_shape) in volume_strategy()) {
        let (z, y, x) = volume.dim();
        let chunk = encode_chunk(volume.view(), ChunkBounds::from_shape([z, y, x]), block_shape, None).unwrap();
        let decoded = decode_chunk(&chunk.buffer, [z, y, x], block_shape).unwrap();
        prop_assert_eq!(decoded, volume);
    }

    #[test]
    fn bitpack_round_trip(
        bits in prop::sample::select(vec![1u32, 2, 4, 8, 16, 32]),
        raw in proptest::collection::vec(any::<u32>(), 0..200),
    ) {
        let mask = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
        let values: Vec<u32> = raw.iter().map(|v| v & mask).collect();
        let packed = pack(&values, bits).unwrap();
        prop_assert_eq!(packed.len() % 4, 0);
        let unpacked = unpack(&packed, bits, values.len()).unwrap();
        prop_assert_eq!(unpacked.len() % (32 / bits as usize), 0);
        prop_assert_eq!(&unpacked[..values.len()], values.as_slice());
    }
}
