//! End-to-end cut scenarios over both store backends

use facetdb::error::Error;
use facetdb::registry::parse_batch;
use facetdb::{
    FacetAddress, FacetCut, JournalStore, MemoryStore, RegistryOptions, RegistryStore, Selector,
    SelectorRegistry, SlotArray, SlotHeader,
};

fn sel(n: u32) -> Selector {
    Selector::from(n)
}

fn facet(byte: u8) -> FacetAddress {
    FacetAddress::repeat(byte)
}

/// Every group is dense and nothing lives past the trailing length
fn assert_dense<S: RegistryStore>(registry: &SelectorRegistry<S>) {
    let header = registry.header();
    assert_eq!(registry.store().group_count(), header.group_count());
    assert_eq!(registry.len() as u64, header.selector_count());
    registry.verify().expect("registry invariants hold");
}

#[test]
fn test_nine_selectors_remove_third_on_journal() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut registry = SelectorRegistry::open(JournalStore::with_defaults(dir.path())?)?;
    let selectors: Vec<_> = (1..=9).map(sel).collect();

    registry.apply_cut(&[FacetCut::add(facet(0xaa), selectors)])?;
    assert_eq!(registry.header(), SlotHeader::new(1, 1));

    let report = registry.apply_cut(&[FacetCut::remove([sel(3)])])?;
    assert_eq!(report.removed, 1);
    assert_eq!(report.word_reads, 2);
    assert_eq!(report.word_writes, 3);

    assert_eq!(registry.header(), SlotHeader::new(1, 0));
    assert_eq!(
        registry.selectors(),
        vec![sel(1), sel(2), sel(9), sel(4), sel(5), sel(6), sel(7), sel(8)]
    );
    assert_dense(&registry);
    Ok(())
}

#[test]
fn test_mixed_batch_keeps_density() -> anyhow::Result<()> {
    let mut registry = SelectorRegistry::open(MemoryStore::new())?;
    registry.apply_cut(&[
        FacetCut::add(facet(0xaa), (1..=12).map(sel)),
        FacetCut::add(facet(0xbb), (13..=20).map(sel)),
    ])?;
    assert_eq!(registry.header(), SlotHeader::new(2, 4));

    // Removals from every group, a replace, and fresh adds in one batch
    let report = registry.apply_cut(&[
        FacetCut::remove([sel(1), sel(9), sel(20), sel(14)]),
        FacetCut::add(facet(0xcc), [sel(2), sel(30), sel(31)]),
        FacetCut::remove([sel(30), sel(5), sel(6), sel(7), sel(8)]),
    ])?;

    assert_eq!(report.added, 2);
    assert_eq!(report.replaced, 1);
    assert_eq!(report.removed, 9);
    assert_eq!(registry.len(), 20 - 8 + 1);
    assert_eq!(registry.resolve(sel(2)), Some(facet(0xcc)));
    assert_eq!(registry.resolve(sel(31)), Some(facet(0xcc)));
    assert_eq!(registry.resolve(sel(30)), None);
    assert_dense(&registry);
    Ok(())
}

#[test]
fn test_remove_everything_deletes_all_groups() -> anyhow::Result<()> {
    let mut registry = SelectorRegistry::open(MemoryStore::new())?;
    registry.apply_cut(&[FacetCut::add(facet(0xaa), (1..=17).map(sel))])?;
    assert_eq!(registry.store().group_count(), 3);

    registry.apply_cut(&[FacetCut::remove((1..=17).rev().map(sel))])?;

    assert!(registry.is_empty());
    assert_eq!(registry.header(), SlotHeader::default());
    assert_eq!(registry.store().group_count(), 0);
    assert_dense(&registry);
    Ok(())
}

#[test]
fn test_failed_batch_leaves_journal_bytes_untouched() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut registry = SelectorRegistry::open(JournalStore::with_defaults(dir.path())?)?;
    registry.apply_cut(&[FacetCut::add(facet(0xaa), (1..=10).map(sel))])?;

    let journal = registry.store().path().to_path_buf();
    let before = std::fs::read(&journal)?;
    let header = registry.header();

    let result = registry.apply_cut(&[
        FacetCut::remove([sel(1), sel(2), sel(3)]),
        FacetCut::add(facet(0xbb), (40..=60).map(sel)),
        FacetCut::add(facet(0xaa), [sel(10)]),
    ]);

    assert!(matches!(result, Err(Error::DuplicateFacet { .. })));
    assert_eq!(std::fs::read(&journal)?, before);
    assert_eq!(registry.header(), header);
    assert_eq!(registry.len(), 10);
    assert_dense(&registry);
    Ok(())
}

#[test]
fn test_immutable_facet_selectors_are_pinned() -> anyhow::Result<()> {
    let options = RegistryOptions {
        immutable_facet: Some(facet(0x01)),
        ..RegistryOptions::default()
    };
    let mut registry = SelectorRegistry::with_options(MemoryStore::new(), options)?;
    registry.apply_cut(&[
        FacetCut::add(facet(0x01), [sel(1)]),
        FacetCut::add(facet(0xaa), [sel(2)]),
    ])?;

    let replace = registry.apply_cut(&[FacetCut::add(facet(0xbb), [sel(1)])]);
    assert!(matches!(replace, Err(Error::ImmutableSelector { selector }) if selector == sel(1)));

    let remove = registry.apply_cut(&[FacetCut::remove([sel(2), sel(1)])]);
    assert!(matches!(remove, Err(Error::ImmutableSelector { .. })));
    assert_eq!(registry.resolve(sel(2)), Some(facet(0xaa)));

    // Other selectors stay mutable
    registry.apply_cut(&[FacetCut::remove([sel(2)])])?;
    assert_eq!(registry.len(), 1);
    assert_dense(&registry);
    Ok(())
}

#[test]
fn test_json_batch() -> anyhow::Result<()> {
    let json = format!(
        r#"[
            {{"facet": "0x{aa}", "selectors": ["0x00000001", "0x00000002"]}},
            {{"facet": "0x{zero}", "selectors": ["0x00000001"]}}
        ]"#,
        aa = "aa".repeat(20),
        zero = "00".repeat(20)
    );
    let cuts = parse_batch(&json)?;
    assert_eq!(cuts.len(), 2);

    let mut registry = SelectorRegistry::open(MemoryStore::new())?;
    let report = registry.apply_cut(&cuts)?;

    assert_eq!((report.added, report.removed), (2, 1));
    assert_eq!(registry.selectors(), vec![sel(2)]);
    Ok(())
}
