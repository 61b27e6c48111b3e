/// The contract a fact segment (or the dictionary's id index) gives the
/// generic B+-tree engine so the engine can stay ignorant of what a
/// triple, a count, or a string is.
///
/// `Key` is the value inner pages route on — for every fact segment
/// this is the leading permuted column (`v1`). `LeafEntry` is whatever
/// a leaf page actually stores; for the six permutations this is a
/// delta-compressible `(v2, v3)` pair, for the fully-aggregated
/// projections just a count.
pub trait BTreeSpec {
    type Key: Ord + Copy;
    type LeafEntry: Clone;

    /// Width in bytes of one encoded `Key` inside an inner page. Keys
    /// inside inner pages are always written with
    /// [`crate::utils::write_u32_aligned`]-style aligned little-endian
    /// encoding, so this is expected to be a multiple of 4.
    fn inner_key_size() -> usize;

    fn read_inner_key(buf: &[u8], offset: usize) -> Self::Key;
    fn write_inner_key(buf: &mut [u8], offset: usize, key: Self::Key);

    /// The routing key a leaf entry would sort under in an inner page.
    fn derive_inner_key(entry: &Self::LeafEntry) -> Self::Key;

    /// Encode a leaf's entries, already sorted by key, into a byte
    /// string fit to be copied verbatim into a leaf page's body. May
    /// delta-compress adjacent entries.
    fn pack_leaf_entries(entries: &[Self::LeafEntry]) -> Vec<u8>;

    /// Inverse of `pack_leaf_entries`.
    fn unpack_leaf_entries(buf: &[u8]) -> Vec<Self::LeafEntry>;

    /// Called when an insert lands on a key already present in a leaf.
    /// Returns the entry that should replace both — e.g. the
    /// aggregated-facts segment bumping a count, or the plain
    /// permutations simply preferring the incoming entry.
    fn merge_conflict_with(existing: &Self::LeafEntry, incoming: &Self::LeafEntry) -> Self::LeafEntry;
}
