//! Size classes for the hash table.

/// One size class: an entry limit plus the twin-prime index parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClass {
    /// Maximum number of dense slots before the table must grow.
    pub max_entries: u32,
    /// Number of index slots (prime).
    pub index_size: u32,
    /// Modulus for the probe step (prime, `index_size - 2`).
    pub rehash: u32,
}

impl SizeClass {
    const fn new(max_entries: u32, index_size: u32, rehash: u32) -> Self {
        SizeClass {
            max_entries,
            index_size,
            rehash,
        }
    }

    /// Probe step for a hash in this class.
    pub fn step(&self, hash: u32) -> u32 {
        1 + hash % self.rehash
    }
}

/// Ascending size classes. Index sizes sit about 10% above the entry limit.
pub const SIZE_CLASSES: &[SizeClass] = &[
    SizeClass::new(16, 19, 17),
    SizeClass::new(32, 43, 41),
    SizeClass::new(64, 73, 71),
    SizeClass::new(128, 151, 149),
    SizeClass::new(256, 283, 281),
    SizeClass::new(512, 571, 569),
    SizeClass::new(1024, 1153, 1151),
    SizeClass::new(2048, 2269, 2267),
    SizeClass::new(4096, 4519, 4517),
    SizeClass::new(8192, 9013, 9011),
    SizeClass::new(16384, 18043, 18041),
    SizeClass::new(32768, 36109, 36107),
    SizeClass::new(65536, 72091, 72089),
    SizeClass::new(131072, 144409, 144407),
    SizeClass::new(262144, 288361, 288359),
    SizeClass::new(524288, 576883, 576881),
    SizeClass::new(1048576, 1153459, 1153457),
    SizeClass::new(2097152, 2307163, 2307161),
    SizeClass::new(4194304, 4613893, 4613891),
    SizeClass::new(8388608, 9227641, 9227639),
    SizeClass::new(16777216, 18455029, 18455027),
    SizeClass::new(33554432, 36911011, 36911009),
    SizeClass::new(67108864, 73819861, 73819859),
    SizeClass::new(134217728, 147639589, 147639587),
    SizeClass::new(268435456, 295279081, 295279079),
    SizeClass::new(536870912, 590559793, 590559791),
    SizeClass::new(1073741824, 1181116273, 1181116271),
    SizeClass::new(2147483648, 2362232233, 2362232231),
];
