//! Integration tests for property links and value propagation.

mod common;

use common::{assert_float_eq, int_value, property, revision, CallLog, Hook, ProcessorBuilder};
use flownet::network::{ConverterRegistry, PropertyId};
use flownet::{
    NetworkError, NetworkObserver, NetworkSettings, ProcessorId, ProcessorNetwork,
    PropertyDescriptor, PropertyLink, PropertyValue,
};
use mockall::mock;
use proptest::prelude::*;
use std::collections::{HashSet, VecDeque};

/// One processor per name, each holding an int property `value`.
fn holders(network: &mut ProcessorNetwork, log: &CallLog, names: &[&str]) -> Vec<PropertyId> {
    names
        .iter()
        .map(|name| {
            network
                .add(ProcessorBuilder::new(name).int("value", 0).build(log))
                .unwrap();
            property(network, name, "value")
        })
        .collect()
}

// ==================== Cycles ====================

#[test]
fn test_link_cycle_updates_each_member_once() {
    let mut network = ProcessorNetwork::new();
    let log = CallLog::new();
    let p = holders(&mut network, &log, &["A", "B", "C"]);
    network.add_link(p[0], p[1]).unwrap();
    network.add_link(p[1], p[2]).unwrap();
    network.add_link(p[2], p[0]).unwrap();
    log.clear();
    let passes = network.pass_count();

    assert!(network.set_property(p[0], PropertyValue::Int(5)).unwrap());

    for &id in &p {
        assert_eq!(int_value(&network, id), 5);
        assert_eq!(revision(&network, id), 1);
    }
    assert!(!network.is_linking());
    // Every owner is re-processed in a single pass.
    assert_eq!(network.pass_count(), passes + 1);
    for name in ["A", "B", "C"] {
        assert_eq!(log.count(name, Hook::Process), 1);
    }
}

#[test]
fn test_bidirectional_link_does_not_echo() {
    let mut network = ProcessorNetwork::new();
    let log = CallLog::new();
    let p = holders(&mut network, &log, &["A", "B"]);
    network.add_link(p[0], p[1]).unwrap();
    network.add_link(p[1], p[0]).unwrap();
    assert!(network.is_linked_bidirectional(p[0], p[1]));

    network.set_property(p[0], PropertyValue::Int(3)).unwrap();
    assert_eq!(int_value(&network, p[1]), 3);
    assert_eq!(revision(&network, p[0]), 1);

    network.set_property(p[1], PropertyValue::Int(4)).unwrap();
    assert_eq!(int_value(&network, p[0]), 4);
    assert_eq!(revision(&network, p[0]), 2);
    assert_eq!(revision(&network, p[1]), 2);
}

#[test]
fn test_diamond_updates_join_once_through_converters() {
    let mut network = ProcessorNetwork::new();
    network
        .converters_mut()
        .register_fn("TickProperty", "TickProperty", |v| {
            v.as_int().map(|i| PropertyValue::Int(i + 1))
        });
    let log = CallLog::new();
    let ids: Vec<PropertyId> = ["A", "B", "C", "D"]
        .iter()
        .map(|name| {
            network
                .add(
                    ProcessorBuilder::new(name)
                        .property(
                            PropertyDescriptor::int("tick", 0).with_class_identifier("TickProperty"),
                        )
                        .build(&log),
                )
                .unwrap();
            property(&network, name, "tick")
        })
        .collect();
    let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);
    network.add_link(a, b).unwrap();
    network.add_link(a, c).unwrap();
    network.add_link(b, d).unwrap();
    network.add_link(c, d).unwrap();

    network.set_property(a, PropertyValue::Int(10)).unwrap();

    assert_eq!(int_value(&network, b), 11);
    assert_eq!(int_value(&network, c), 11);
    assert_eq!(int_value(&network, d), 12);
    assert_eq!(revision(&network, d), 1);
}

// ==================== Conversion and rejection ====================

#[test]
fn test_link_converts_between_value_kinds() {
    let mut network = ProcessorNetwork::new();
    let log = CallLog::new();
    network
        .add(ProcessorBuilder::new("count").int("value", 0).build(&log))
        .unwrap();
    network
        .add(
            ProcessorBuilder::new("gain")
                .property(PropertyDescriptor::float("level", 0.0))
                .property(PropertyDescriptor::string("label", ""))
                .build(&log),
        )
        .unwrap();
    let count = property(&network, "count", "value");
    let level = property(&network, "gain", "level");
    let label = property(&network, "gain", "label");
    network.add_link(count, level).unwrap();
    network.add_link(count, label).unwrap();

    network.set_property(count, PropertyValue::Int(4)).unwrap();

    let value = network.property_value(level).and_then(PropertyValue::as_float).unwrap();
    assert_float_eq(value, 4.0, 1e-9);
    assert_eq!(network.property_value(label).and_then(PropertyValue::as_str), Some("4"));
}

#[test]
fn test_invalid_links_are_rejected() {
    let mut network = ProcessorNetwork::new();
    let log = CallLog::new();
    network
        .add(
            ProcessorBuilder::new("holder")
                .property(PropertyDescriptor::bool("enabled", false))
                .property(PropertyDescriptor::float("level", 0.0))
                .build(&log),
        )
        .unwrap();
    let enabled = property(&network, "holder", "enabled");
    let level = property(&network, "holder", "level");

    assert!(matches!(
        network.add_link(enabled, enabled),
        Err(NetworkError::SelfLink(_))
    ));
    assert!(!network.can_link(enabled, level));
    assert!(matches!(
        network.add_link(enabled, level),
        Err(NetworkError::NoConverter { .. })
    ));
    let missing = PropertyId::new(ProcessorId(99), 0);
    assert!(matches!(
        network.add_link(missing, level),
        Err(NetworkError::UnknownProperty(_))
    ));
    assert!(network.links().is_empty());
}

#[test]
fn test_set_property_rejects_other_kinds() {
    let mut network = ProcessorNetwork::new();
    let log = CallLog::new();
    network
        .add(
            ProcessorBuilder::new("cam")
                .int("value", 1)
                .property(PropertyDescriptor::composite(
                    "camera",
                    vec![PropertyDescriptor::float("fov", 60.0)],
                ))
                .build(&log),
        )
        .unwrap();
    let value = property(&network, "cam", "value");
    let camera = property(&network, "cam", "camera");

    assert!(matches!(
        network.set_property(value, PropertyValue::Float(2.0)),
        Err(NetworkError::ValueTypeMismatch { .. })
    ));
    assert!(matches!(
        network.set_property(camera, PropertyValue::Composite),
        Err(NetworkError::ValueTypeMismatch { .. })
    ));
    assert!(!network.set_property(value, PropertyValue::Int(1)).unwrap());
    assert_eq!(revision(&network, value), 0);
}

// ==================== Composites ====================

#[test]
fn test_composite_link_copies_members_and_cascades() {
    let mut network = ProcessorNetwork::new();
    let log = CallLog::new();
    let camera = || {
        PropertyDescriptor::composite(
            "camera",
            vec![
                PropertyDescriptor::int("fov", 60),
                PropertyDescriptor::float("near", 0.1),
            ],
        )
    };
    for name in ["cam1", "cam2"] {
        network
            .add(ProcessorBuilder::new(name).property(camera()).build(&log))
            .unwrap();
    }
    network
        .add(ProcessorBuilder::new("display").int("fov", 0).build(&log))
        .unwrap();

    let cam1 = property(&network, "cam1", "camera");
    let cam2 = property(&network, "cam2", "camera");
    let cam1_fov = network.property_by_path(&["cam1", "camera", "fov"]).unwrap();
    let cam2_fov = network.property_by_path(&["cam2", "camera", "fov"]).unwrap();
    let cam2_near = network.property_by_path(&["cam2", "camera", "near"]).unwrap();
    let display_fov = property(&network, "display", "fov");
    network.add_link(cam1, cam2).unwrap();
    network.add_link(cam2_fov, display_fov).unwrap();

    network.set_property(cam1_fov, PropertyValue::Int(90)).unwrap();

    assert_eq!(int_value(&network, cam2_fov), 90);
    assert_eq!(int_value(&network, display_fov), 90);
    assert_eq!(revision(&network, display_fov), 1);
    assert_eq!(revision(&network, cam2_near), 0);
}

// ==================== Auto-linking ====================

#[test]
fn test_auto_link_keeps_existing_value() {
    let mut network = ProcessorNetwork::new();
    let log = CallLog::new();
    network
        .add(ProcessorBuilder::new("first").int("value", 7).build(&log))
        .unwrap();
    let second = network
        .add(
            ProcessorBuilder::new("second")
                .int("value", 0)
                .property(PropertyDescriptor::int("private", 0).not_linkable())
                .build(&log),
        )
        .unwrap();
    let first_value = property(&network, "first", "value");
    let second_value = property(&network, "second", "value");

    let links = network.auto_link_processor(second).unwrap();

    assert_eq!(
        links,
        vec![
            PropertyLink::new(first_value, second_value),
            PropertyLink::new(second_value, first_value),
        ]
    );
    assert_eq!(int_value(&network, second_value), 7);
    assert_eq!(int_value(&network, first_value), 7);

    network.set_property(second_value, PropertyValue::Int(3)).unwrap();
    assert_eq!(int_value(&network, first_value), 3);

    let (a, b) = (first_value.processor(), second);
    assert_eq!(network.links_between_processors(a, b).len(), 2);
    assert_eq!(network.properties_linked_to(first_value), vec![second_value]);
}

#[test]
fn test_auto_link_respects_settings() {
    let mut settings = NetworkSettings::default();
    settings.links.enable_auto_link = false;
    let mut network = ProcessorNetwork::with_settings(settings);
    let log = CallLog::new();
    holders(&mut network, &log, &["first"]);
    let second = network
        .add(ProcessorBuilder::new("second").int("value", 0).build(&log))
        .unwrap();

    assert!(network.auto_link_processor(second).unwrap().is_empty());
    assert!(network.links().is_empty());
}

// ==================== Structure ====================

#[test]
fn test_removing_link_stops_propagation() {
    let mut network = ProcessorNetwork::new();
    let log = CallLog::new();
    let p = holders(&mut network, &log, &["A", "B", "C"]);
    network.add_link(p[0], p[1]).unwrap();
    network.add_link(p[1], p[2]).unwrap();
    network.set_property(p[0], PropertyValue::Int(1)).unwrap();
    assert_eq!(int_value(&network, p[2]), 1);

    assert!(network.remove_link(p[1], p[2]));
    assert!(!network.remove_link(p[1], p[2]));
    network.set_property(p[0], PropertyValue::Int(2)).unwrap();

    assert_eq!(int_value(&network, p[1]), 2);
    assert_eq!(int_value(&network, p[2]), 1);
    assert!(network.properties_linked_to(p[1]).is_empty());
}

#[test]
fn test_replacing_converters_applies_to_existing_links() {
    let mut network = ProcessorNetwork::new();
    let log = CallLog::new();
    let p = holders(&mut network, &log, &["A", "B"]);
    network.add_link(p[0], p[1]).unwrap();
    network.set_property(p[0], PropertyValue::Int(1)).unwrap();

    *network.converters_mut() = ConverterRegistry::new();
    network
        .converters_mut()
        .register_fn("IntProperty", "IntProperty", |v| {
            v.as_int().map(|i| PropertyValue::Int(i * 10))
        });
    network.set_property(p[0], PropertyValue::Int(2)).unwrap();

    assert_eq!(int_value(&network, p[1]), 20);
}

mock! {
    pub Observer {}

    impl NetworkObserver for Observer {
        fn will_add_link(&mut self, link: PropertyLink);
        fn did_add_link(&mut self, link: PropertyLink);
        fn on_network_changed(&mut self);
        fn on_network_unlocked(&mut self);
    }
}

#[test]
fn test_observer_sees_link_and_value_changes() {
    let mut network = ProcessorNetwork::new();
    let log = CallLog::new();
    let p = holders(&mut network, &log, &["A", "B"]);

    let mut observer = MockObserver::new();
    let expected = PropertyLink::new(p[0], p[1]);
    observer
        .expect_will_add_link()
        .withf(move |link| *link == expected)
        .times(1)
        .return_const(());
    observer
        .expect_did_add_link()
        .withf(move |link| *link == expected)
        .times(1)
        .return_const(());
    // Propagated writes do not count as separate changes.
    observer.expect_on_network_changed().times(1).return_const(());
    observer.expect_on_network_unlocked().return_const(());
    let observer_id = network.add_observer(Box::new(observer));

    network.add_link(p[0], p[1]).unwrap();
    network.set_property(p[0], PropertyValue::Int(9)).unwrap();

    drop(network.remove_observer(observer_id));
}

// ==================== Properties ====================

proptest! {
    #[test]
    fn prop_propagation_reaches_every_linked_property_once(
        (n, edges) in (2usize..7).prop_flat_map(|n| {
            (Just(n), proptest::collection::vec((0..n, 0..n), 0..20))
        })
    ) {
        let mut network = ProcessorNetwork::new();
        let log = CallLog::new();
        let names: Vec<String> = (0..n).map(|i| format!("p{}", i)).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let p = holders(&mut network, &log, &name_refs);

        let mut adjacency = vec![Vec::new(); n];
        for (from, to) in edges {
            if from != to && !network.is_linked(p[from], p[to]) {
                network.add_link(p[from], p[to]).unwrap();
                adjacency[from].push(to);
            }
        }

        network.set_property(p[0], PropertyValue::Int(42)).unwrap();

        let mut reachable = HashSet::from([0]);
        let mut queue = VecDeque::from([0]);
        while let Some(i) = queue.pop_front() {
            for &j in &adjacency[i] {
                if reachable.insert(j) {
                    queue.push_back(j);
                }
            }
        }

        prop_assert!(!network.is_linking());
        for i in 0..n {
            let (expected_value, expected_revision) =
                if reachable.contains(&i) { (42, 1) } else { (0, 0) };
            prop_assert_eq!(int_value(&network, p[i]), expected_value);
            prop_assert_eq!(revision(&network, p[i]), expected_revision);
        }
    }
}
