use partbound_core::{
    build_bound_info, check_new_bound_overlap, derive_constraint, display_constraint, Conflict,
    KeyColumn, NoExpressions, PartitionBoundSpec, PartitionDesc, PartitionError, PartitionKey,
    PartitionStrategy, Predicate, RangeDatum, RangeDatumKind, RelationId, Value,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn int_range_key() -> PartitionKey {
    PartitionKey::range(vec![KeyColumn::column(
        "id",
        0,
        partbound_core::ColumnType::Integer,
    )])
    .expect("single column key")
}

fn int(v: i64) -> RangeDatum {
    RangeDatum::Value(Value::Integer(v))
}

fn range(lower: RangeDatum, upper: RangeDatum) -> PartitionBoundSpec {
    PartitionBoundSpec::range(vec![lower], vec![upper])
}

#[test]
fn unbounded_ends_share_inner_boundaries() {
    init_logging();
    let key = int_range_key();
    let children = vec![
        (RelationId(1), range(RangeDatum::MinValue, int(10))),
        (RelationId(2), range(int(10), int(20))),
        (RelationId(3), range(int(20), RangeDatum::MaxValue)),
    ];
    let desc = PartitionDesc::build(&key, &children, None).unwrap();
    let info = desc.bounds().expect("partitions present");

    // MINVALUE, 10, 20, MAXVALUE: the lower bounds at 10 and 20 are folded
    // into the upper bounds of the partitions below them.
    assert_eq!(info.ndatums(), 4);
    assert_eq!(info.kinds(0), Some(&[RangeDatumKind::MinValue][..]));
    assert_eq!(info.datums(1), &[Value::Integer(10)]);
    assert_eq!(info.datums(2), &[Value::Integer(20)]);
    assert_eq!(info.kinds(3), Some(&[RangeDatumKind::MaxValue][..]));
    assert_eq!(info.indexes(), &[None, Some(0), Some(1), Some(2), None]);
    assert_eq!(desc.oids(), &[RelationId(1), RelationId(2), RelationId(3)]);

    let route = |v: i64| {
        info.partition_for_values(&key, &[Value::Integer(v)])
            .map(|index| desc.oids()[index])
    };
    assert_eq!(route(15), Some(RelationId(2)));
    assert_eq!(route(20), Some(RelationId(3)));
    assert_eq!(route(i64::MIN), Some(RelationId(1)));
    assert_eq!(route(i64::MAX), Some(RelationId(3)));
}

#[test]
fn list_with_null_only_partition() {
    init_logging();
    let key = PartitionKey::list(KeyColumn::column(
        "code",
        0,
        partbound_core::ColumnType::Integer,
    ));
    let children = vec![
        (
            RelationId(10),
            PartitionBoundSpec::list(vec![Value::Integer(1), Value::Integer(2)]),
        ),
        (
            RelationId(11),
            PartitionBoundSpec::list(vec![Value::Integer(3), Value::Integer(4)]),
        ),
        (RelationId(12), PartitionBoundSpec::list(vec![Value::Null])),
    ];
    let desc = PartitionDesc::build(&key, &children, None).unwrap();
    let info = desc.bounds().unwrap();
    let null_index = info.null_index().expect("null partition");
    assert_eq!(desc.oids()[null_index], RelationId(12));

    let route = |v: Value| {
        info.partition_for_values(&key, &[v])
            .map(|index| desc.oids()[index])
    };
    assert_eq!(route(Value::Null), Some(RelationId(12)));
    assert_eq!(route(Value::Integer(3)), Some(RelationId(11)));
    assert_eq!(route(Value::Integer(5)), None);
}

#[test]
fn overlap_checks_around_existing_range() {
    let key = int_range_key();
    let existing = vec![range(int(10), int(20))];
    let (info, _) = build_bound_info(&key, &existing).unwrap();

    let check = |spec: PartitionBoundSpec| check_new_bound_overlap("p_new", &key, Some(&info), &spec);
    assert_eq!(check(range(int(20), int(30))).unwrap(), None);
    assert_eq!(
        check(range(int(15), int(25))).unwrap(),
        Some(Conflict::Overlaps(0))
    );
    assert!(matches!(
        check(range(int(20), int(20))),
        Err(PartitionError::EmptyRangeBound { .. })
    ));
}

#[test]
fn derived_constraint_agrees_with_routing() {
    let key = int_range_key();
    let specs = vec![
        range(RangeDatum::MinValue, int(0)),
        range(int(0), int(100)),
        range(int(250), RangeDatum::MaxValue),
    ];
    let (info, mapping) = build_bound_info(&key, &specs).unwrap();
    let quals: Vec<Predicate> = specs
        .iter()
        .map(|spec| Predicate::and_all(derive_constraint(&key, spec).unwrap()))
        .collect();

    for v in [-50, 0, 99, 100, 180, 250, 10_000] {
        let row = [Value::Integer(v)];
        let routed = info.partition_for_values(&key, &row);
        for (ordinal, qual) in quals.iter().enumerate() {
            let accepted = qual.evaluate(&row, &NoExpressions).unwrap() == Some(true);
            assert_eq!(
                accepted,
                routed == Some(mapping[ordinal]),
                "value {v} against {}",
                qual
            );
        }
    }
    assert_eq!(
        display_constraint(&derive_constraint(&key, &specs[0]).unwrap()),
        "(id IS NOT NULL) AND (id < 0)"
    );
}

#[test]
fn catalog_text_feeds_the_canonicalizer() {
    let key = PartitionKey::new(
        PartitionStrategy::List,
        vec![KeyColumn::column(
            "region",
            0,
            partbound_core::ColumnType::Text,
        )],
    )
    .unwrap();
    let stored = PartitionBoundSpec::list(vec![Value::Text("eu".into())])
        .to_catalog_text()
        .unwrap();
    let spec = PartitionBoundSpec::from_catalog_text(&stored).unwrap();
    let (info, _) = build_bound_info(&key, [&spec]).unwrap();
    assert_eq!(
        info.partition_for_values(&key, &[Value::Text("eu".into())]),
        Some(0)
    );
}
