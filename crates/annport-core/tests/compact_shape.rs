use annport_core::CompactShape;
use proptest::prelude::*;

proptest! {
    #[test]
    fn four_dims_survive_packing(dims in prop::array::uniform4(0usize..65_536)) {
        let packed = CompactShape::encode(&dims);
        let expected = dims[0] as u64
            | (dims[1] as u64) << 16
            | (dims[2] as u64) << 32
            | (dims[3] as u64) << 48;
        prop_assert_eq!(packed.raw(), expected);

        let lanes = packed.lanes();
        let decoded: Vec<usize> = lanes.iter().map(|&l| l as usize).collect();
        prop_assert_eq!(decoded, dims.to_vec());
    }

    #[test]
    fn nonzero_dims_decode_without_rank(dims in prop::collection::vec(1usize..65_536, 0..=4)) {
        prop_assert_eq!(CompactShape::encode(&dims).dims(), dims.clone());
        prop_assert!(CompactShape::try_encode(&dims).is_some());
    }
}
