//! Tests for tagged property save and load.

use propwire_core::{
    Archive, ArchiveFlags, MemoryReader, MemoryWriter, Name, ObjectHandle, ObjectTable, PassMode,
};

use crate::{
    EnumDef, Environment, Instance, LoadReport, PropertyDescriptor as P, PropertyFlags, PropertyTag, ReflectError,
    SerializeContext, SkipReason, StructFlags, TagPayload, TypeDef, TypeId, TypeRegistry, Value, collect_references,
    serialize_instance, serialize_tagged,
};

fn register(registry: &mut TypeRegistry, def: TypeDef) -> TypeId {
    let id = registry.add_type(def);
    registry.link_all().unwrap();
    id
}

fn save_into(
    registry: &TypeRegistry,
    env: &Environment,
    w: &mut MemoryWriter,
    instance: &mut Instance,
    defaults: Option<&Instance>,
) {
    let mut objects = ObjectTable::new();
    let mut ctx = SerializeContext::new(registry, env, &mut objects);
    let ty = instance.type_id();
    let report = serialize_tagged(&mut ctx, w, ty, instance.memory_mut(), defaults.map(Instance::memory)).unwrap();
    assert!(report.is_clean());
}

fn save(registry: &TypeRegistry, instance: &mut Instance) -> Vec<u8> {
    let mut w = MemoryWriter::new();
    save_into(registry, &Environment::new(), &mut w, instance, None);
    w.into_bytes()
}

fn load_from(
    registry: &TypeRegistry,
    env: &Environment,
    r: &mut MemoryReader<'_>,
    ty: TypeId,
) -> (Instance, LoadReport) {
    let mut objects = ObjectTable::new();
    let mut ctx = SerializeContext::new(registry, env, &mut objects);
    let mut instance = registry.new_instance(ty);
    let report = serialize_tagged(&mut ctx, r, ty, instance.memory_mut(), None).unwrap();
    (instance, report)
}

fn load(registry: &TypeRegistry, ty: TypeId, bytes: &[u8]) -> (Instance, LoadReport) {
    let mut r = MemoryReader::new(bytes);
    let loaded = load_from(registry, &Environment::new(), &mut r, ty);
    assert_eq!(r.remaining(), 0);
    loaded
}

fn set(registry: &TypeRegistry, instance: &mut Instance, field: &str, value: Value) {
    registry.set_value(instance, field, 0, &value).unwrap();
}

fn get(registry: &TypeRegistry, instance: &Instance, field: &str) -> Value {
    registry.get_value(instance, field, 0).unwrap()
}

fn read_tag(r: &mut MemoryReader<'_>) -> PropertyTag {
    let mut tag = PropertyTag::terminator();
    tag.serialize(r).unwrap();
    tag
}

/// Tags of the top-level section with their sizes. Payloads are skipped.
fn describe(bytes: &[u8]) -> String {
    let mut r = MemoryReader::new(bytes);
    let mut out = Vec::new();
    loop {
        let tag = read_tag(&mut r);
        if tag.is_terminator() {
            break;
        }
        out.push(format!("{}[{}] {} {}", tag.name, tag.array_index, tag.type_name, tag.size));
        r.skip(tag.size as usize).unwrap();
    }
    assert_eq!(r.remaining(), 0);
    out.join("\n")
}

/// Field names in the section nested under the first tag.
fn nested_fields(bytes: &[u8]) -> Vec<String> {
    let mut r = MemoryReader::new(bytes);
    read_tag(&mut r);
    let mut names = Vec::new();
    loop {
        let tag = read_tag(&mut r);
        if tag.is_terminator() {
            break;
        }
        names.push(tag.name.to_string());
        r.skip(tag.size as usize).unwrap();
    }
    names
}

fn write_int_tag(w: &mut MemoryWriter, name: &str, value: i32, size: i32) {
    let mut tag = PropertyTag {
        name: Name::new(name),
        type_name: Name::new("IntProperty"),
        size: 0,
        array_index: 0,
        payload: TagPayload::None,
    };
    let placeholder = tag.serialize(w).unwrap().unwrap();
    w.xfer_i32(&mut { value }).unwrap();
    let written = 4;
    for _ in written..size {
        w.xfer_u8(&mut 0xEE).unwrap();
    }
    w.commit(placeholder, size).unwrap();
}

fn terminate(w: &mut MemoryWriter) {
    PropertyTag::terminator().serialize(w).unwrap();
}

#[test]
fn changed_fields_are_tagged() {
    let mut registry = TypeRegistry::new();
    let ty = register(&mut registry, TypeDef::class("Thing").property(P::int("a")).property(P::bool("b")));

    let mut instance = registry.new_instance(ty);
    set(&registry, &mut instance, "a", Value::Int(5));
    set(&registry, &mut instance, "b", Value::Bool(true));
    let bytes = save(&registry, &mut instance);

    insta::assert_snapshot!(describe(&bytes), @r"
    a[0] IntProperty 4
    b[0] BoolProperty 0
    ");

    let (loaded, report) = load(&registry, ty, &bytes);
    assert!(report.is_clean());
    assert_eq!(get(&registry, &loaded, "a"), Value::Int(5));
    assert_eq!(get(&registry, &loaded, "b"), Value::Bool(true));
}

#[test]
fn default_valued_instance_writes_only_terminator() {
    let mut registry = TypeRegistry::new();
    let ty = register(&mut registry, TypeDef::class("Thing").property(P::int("a")).property(P::bool("b")));

    let mut instance = registry.new_instance(ty);
    let bytes = save(&registry, &mut instance);
    assert_eq!(bytes, b"\x05\x00\x00\x00None\x00");
}

#[test]
fn registered_defaults_are_diffed() {
    let mut registry = TypeRegistry::new();
    let ty = register(
        &mut registry,
        TypeDef::class("Pawn").property(P::int("Health")).property(P::float("Speed")),
    );
    let mut defaults = registry.new_instance(ty);
    set(&registry, &mut defaults, "Health", Value::Int(100));
    set(&registry, &mut defaults, "Speed", Value::Float(1.5));
    registry.set_defaults(ty, defaults);

    let mut instance = registry.instantiate(ty).unwrap();
    set(&registry, &mut instance, "Speed", Value::Float(3.0));

    let env = Environment::new();
    let mut objects = ObjectTable::new();
    let mut w = MemoryWriter::new();
    let mut ctx = SerializeContext::new(&registry, &env, &mut objects);
    serialize_instance(&mut ctx, &mut w, &mut instance).unwrap();
    let bytes = w.into_bytes();
    insta::assert_snapshot!(describe(&bytes), @"Speed[0] FloatProperty 4");

    let mut loaded = registry.instantiate(ty).unwrap();
    let mut r = MemoryReader::new(&bytes);
    serialize_instance(&mut ctx, &mut r, &mut loaded).unwrap();
    assert_eq!(get(&registry, &loaded, "Health"), Value::Int(100));
    assert_eq!(get(&registry, &loaded, "Speed"), Value::Float(3.0));
}

#[test]
fn every_kind_roundtrips() {
    let mut registry = TypeRegistry::new();
    let mode = registry.add_enum(EnumDef::new("EMode", ["Walk", "Run", "Fly"]));
    let vector = register(
        &mut registry,
        TypeDef::structure("Vector").property(P::float("X")).property(P::float("Y")),
    );
    let ty = register(
        &mut registry,
        TypeDef::class("Everything")
            .property(P::byte("Level"))
            .property(P::int("Count"))
            .property(P::float("Scale"))
            .property(P::bool("bOn"))
            .property(P::name("Tag"))
            .property(P::string("Title"))
            .property(P::object("Owner"))
            .property(P::structure("Pos", vector))
            .property(P::array("Items", P::int("Items")))
            .property(P::array("Labels", P::string("Labels")))
            .property(P::array("Flags", P::bool("Flags")))
            .property(P::array("Path", P::structure("Path", vector)))
            .property(P::enum_byte("Mode", mode)),
    );

    let values = [
        ("Level", Value::Byte(7)),
        ("Count", Value::Int(-3)),
        ("Scale", Value::Float(0.25)),
        ("bOn", Value::Bool(true)),
        ("Tag", Value::Name(Name::new("Hero"))),
        ("Title", Value::Str("Sir".to_owned())),
        ("Owner", Value::Object(ObjectHandle(0xABCD))),
        ("Pos", Value::Struct(vec![Value::Float(1.0), Value::Float(2.0)])),
        ("Items", Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])),
        ("Labels", Value::Array(vec![Value::Str("a".to_owned()), Value::Str("bc".to_owned())])),
        ("Flags", Value::Array(vec![Value::Bool(true), Value::Bool(false), Value::Bool(true)])),
        (
            "Path",
            Value::Array(vec![
                Value::Struct(vec![Value::Float(0.5), Value::Float(0.0)]),
                Value::Struct(vec![Value::Float(0.0), Value::Float(-1.0)]),
            ]),
        ),
        ("Mode", Value::Byte(2)),
    ];

    let mut instance = registry.new_instance(ty);
    for (field, value) in &values {
        set(&registry, &mut instance, field, value.clone());
    }
    let bytes = save(&registry, &mut instance);
    let (loaded, report) = load(&registry, ty, &bytes);

    assert!(report.is_clean());
    for (field, value) in &values {
        assert_eq!(&get(&registry, &loaded, field), value, "{field}");
    }
}

#[test]
fn fixed_array_writes_changed_elements() {
    let mut registry = TypeRegistry::new();
    let ty = register(&mut registry, TypeDef::class("Grid").property(P::int("Slots").array_dim(3)));

    let mut instance = registry.new_instance(ty);
    registry.set_value(&mut instance, "Slots", 0, &Value::Int(4)).unwrap();
    registry.set_value(&mut instance, "Slots", 2, &Value::Int(6)).unwrap();
    let bytes = save(&registry, &mut instance);

    insta::assert_snapshot!(describe(&bytes), @r"
    Slots[0] IntProperty 4
    Slots[2] IntProperty 4
    ");

    let (loaded, _) = load(&registry, ty, &bytes);
    assert_eq!(registry.get_value(&loaded, "Slots", 2).unwrap(), Value::Int(6));
}

#[test]
fn enum_byte_stores_entry_name() {
    let mut registry = TypeRegistry::new();
    let color = registry.add_enum(EnumDef::new("EColor", ["Red", "Green", "Blue"]));
    let ty = register(&mut registry, TypeDef::class("Paint").property(P::enum_byte("Color", color)));

    let mut instance = registry.new_instance(ty);
    set(&registry, &mut instance, "Color", Value::Byte(1));
    let bytes = save(&registry, &mut instance);

    let mut r = MemoryReader::new(&bytes);
    let tag = read_tag(&mut r);
    assert_eq!(tag.enum_name(), Name::new("EColor"));
    let mut entry = Name::NONE;
    r.xfer_name(&mut entry).unwrap();
    assert_eq!(entry, Name::new("Green"));
}

#[test]
fn enum_value_past_max_loads_as_max() {
    let mut registry = TypeRegistry::new();
    let color = registry.add_enum(EnumDef::new("EColor", ["Red", "Green", "Blue"]));
    let ty = register(&mut registry, TypeDef::class("Paint").property(P::enum_byte("Color", color)));

    let mut instance = registry.new_instance(ty);
    set(&registry, &mut instance, "Color", Value::Byte(200));
    let bytes = save(&registry, &mut instance);

    let (loaded, _) = load(&registry, ty, &bytes);
    assert_eq!(get(&registry, &loaded, "Color"), Value::Byte(3));
}

/// Saves one `Paint` whose `Color` is an enum byte of `entries` set to `value`.
fn saved_enum_color(entries: &[&str], value: u8) -> Vec<u8> {
    let mut registry = TypeRegistry::new();
    let color = registry.add_enum(EnumDef::new("EColor", entries.iter().copied()));
    let ty = register(&mut registry, TypeDef::class("Paint").property(P::enum_byte("Color", color)));
    let mut instance = registry.new_instance(ty);
    set(&registry, &mut instance, "Color", Value::Byte(value));
    save(&registry, &mut instance)
}

fn int_color_reader(with_enum: bool) -> (TypeRegistry, TypeId) {
    let mut registry = TypeRegistry::new();
    if with_enum {
        registry.add_enum(EnumDef::new("EColor", ["Red", "Green", "Blue"]));
    }
    let ty = register(&mut registry, TypeDef::class("Paint").property(P::int("Color")));
    (registry, ty)
}

#[test]
fn enum_byte_converts_to_int() {
    let bytes = saved_enum_color(&["Red", "Green", "Blue"], 2);
    let (registry, ty) = int_color_reader(true);

    let (loaded, report) = load(&registry, ty, &bytes);
    assert_eq!(get(&registry, &loaded, "Color"), Value::Int(2));
    insta::assert_snapshot!(report.to_string().trim_end(), @"convert Paint.Color: ByteProperty -> IntProperty");
}

#[test]
fn enum_index_past_a_byte_saturates() {
    let bytes = saved_enum_color(&["E0", "E299"], 1);

    let entries: Vec<String> = (0..300).map(|i| format!("E{i}")).collect();
    let mut registry = TypeRegistry::new();
    let color = registry.add_enum(EnumDef::new("EColor", entries.iter().map(String::as_str)));
    let ty = register(&mut registry, TypeDef::class("Paint").property(P::enum_byte("Color", color)));

    let (loaded, report) = load(&registry, ty, &bytes);
    assert!(report.is_clean());
    assert_eq!(get(&registry, &loaded, "Color"), Value::Byte(u8::MAX));
}

#[test]
fn unknown_enum_entry_clamps_to_max() {
    let bytes = saved_enum_color(&["Red", "Green", "Blue", "Purple"], 3);
    let (registry, ty) = int_color_reader(true);

    let (loaded, _) = load(&registry, ty, &bytes);
    assert_eq!(get(&registry, &loaded, "Color"), Value::Int(3));
}

#[test]
fn unregistered_enum_converts_to_zero() {
    let bytes = saved_enum_color(&["Red", "Green", "Blue"], 2);
    let (registry, ty) = int_color_reader(false);

    let (loaded, report) = load(&registry, ty, &bytes);
    assert_eq!(get(&registry, &loaded, "Color"), Value::Int(0));
    assert_eq!(report.conversions.len(), 1);
}

#[test]
fn byte_that_gained_an_enum_keeps_its_value() {
    let mut writer = TypeRegistry::new();
    let ty = register(&mut writer, TypeDef::class("Unit").property(P::byte("Mode")));
    let mut instance = writer.new_instance(ty);
    set(&writer, &mut instance, "Mode", Value::Byte(2));
    let bytes = save(&writer, &mut instance);

    let mut reader = TypeRegistry::new();
    let mode = reader.add_enum(EnumDef::new("EMode", ["Walk", "Run", "Fly"]));
    let ty = register(&mut reader, TypeDef::class("Unit").property(P::enum_byte("Mode", mode)));

    let (loaded, report) = load(&reader, ty, &bytes);
    assert_eq!(get(&reader, &loaded, "Mode"), Value::Byte(2));
    assert_eq!(report.conversions.len(), 1);
}

#[test]
fn byte_that_lost_its_enum_takes_the_entry_index() {
    let mut writer = TypeRegistry::new();
    let mode = writer.add_enum(EnumDef::new("EMode", ["Walk", "Run", "Fly"]));
    let ty = register(&mut writer, TypeDef::class("Unit").property(P::enum_byte("Mode", mode)));
    let mut instance = writer.new_instance(ty);
    set(&writer, &mut instance, "Mode", Value::Byte(1));
    let bytes = save(&writer, &mut instance);

    let mut reader = TypeRegistry::new();
    reader.add_enum(EnumDef::new("EMode", ["Walk", "Run", "Fly"]));
    let ty = register(&mut reader, TypeDef::class("Unit").property(P::byte("Mode")));

    let (loaded, _) = load(&reader, ty, &bytes);
    assert_eq!(get(&reader, &loaded, "Mode"), Value::Byte(1));
}

#[test]
fn string_converts_to_name() {
    let mut writer = TypeRegistry::new();
    let ty = register(&mut writer, TypeDef::class("Sign").property(P::string("Label")));
    let mut instance = writer.new_instance(ty);
    set(&writer, &mut instance, "Label", Value::Str("Exit".to_owned()));
    let bytes = save(&writer, &mut instance);

    let mut reader = TypeRegistry::new();
    let ty = register(&mut reader, TypeDef::class("Sign").property(P::name("Label")));
    let (loaded, report) = load(&reader, ty, &bytes);

    assert_eq!(get(&reader, &loaded, "Label"), Value::Name(Name::new("Exit")));
    assert_eq!(report.conversions[0].to, "NameProperty");
}

#[test]
fn unreadable_tags_are_skipped_and_reported() {
    let mut writer = TypeRegistry::new();
    let vec_a = register(&mut writer, TypeDef::structure("VecA").property(P::float("X")));
    let ty = register(
        &mut writer,
        TypeDef::class("Thing")
            .property(P::int("Gone"))
            .property(P::float("Kind"))
            .property(P::int("Slots").array_dim(3))
            .property(P::structure("Pos", vec_a))
            .property(P::int("Last")),
    );
    let mut instance = writer.new_instance(ty);
    set(&writer, &mut instance, "Gone", Value::Int(1));
    set(&writer, &mut instance, "Kind", Value::Float(2.0));
    for i in 0..3 {
        writer.set_value(&mut instance, "Slots", i, &Value::Int(10 + i as i32)).unwrap();
    }
    set(&writer, &mut instance, "Pos", Value::Struct(vec![Value::Float(1.0)]));
    set(&writer, &mut instance, "Last", Value::Int(99));
    let bytes = save(&writer, &mut instance);

    let mut reader = TypeRegistry::new();
    let vec_b = register(&mut reader, TypeDef::structure("VecB").property(P::float("X")));
    let ty = register(
        &mut reader,
        TypeDef::class("Thing")
            .property(P::name("Kind"))
            .property(P::int("Slots").array_dim(2))
            .property(P::structure("Pos", vec_b))
            .property(P::int("Last")),
    );
    let (loaded, report) = load(&reader, ty, &bytes);

    assert_eq!(reader.get_value(&loaded, "Slots", 0).unwrap(), Value::Int(10));
    assert_eq!(reader.get_value(&loaded, "Slots", 1).unwrap(), Value::Int(11));
    assert_eq!(get(&reader, &loaded, "Last"), Value::Int(99));
    insta::assert_snapshot!(report.to_string().trim_end(), @r"
    skip Thing.Gone[0] IntProperty (4 bytes): unknown field
    skip Thing.Kind[0] FloatProperty (4 bytes): type mismatch
    skip Thing.Slots[2] IntProperty (4 bytes): array index out of range
    skip Thing.Pos[0] StructProperty (45 bytes): struct type mismatch
    ");
}

#[test]
fn tags_out_of_declaration_order() {
    let mut writer = TypeRegistry::new();
    let ty = register(
        &mut writer,
        TypeDef::class("Thing").property(P::int("C")).property(P::int("A")).property(P::int("B")),
    );
    let mut instance = writer.new_instance(ty);
    set(&writer, &mut instance, "A", Value::Int(1));
    set(&writer, &mut instance, "B", Value::Int(2));
    set(&writer, &mut instance, "C", Value::Int(3));
    let bytes = save(&writer, &mut instance);

    let mut reader = TypeRegistry::new();
    let ty = register(
        &mut reader,
        TypeDef::class("Thing").property(P::int("A")).property(P::int("B")).property(P::int("C")),
    );
    let (loaded, report) = load(&reader, ty, &bytes);

    assert!(report.is_clean());
    assert_eq!(get(&reader, &loaded, "A"), Value::Int(1));
    assert_eq!(get(&reader, &loaded, "B"), Value::Int(2));
    assert_eq!(get(&reader, &loaded, "C"), Value::Int(3));
}

#[test]
fn tag_size_wins_over_consumed_bytes() {
    let mut w = MemoryWriter::new();
    write_int_tag(&mut w, "A", 7, 8);
    write_int_tag(&mut w, "B", 9, 4);
    terminate(&mut w);
    let bytes = w.into_bytes();

    let mut registry = TypeRegistry::new();
    let ty = register(&mut registry, TypeDef::class("Thing").property(P::int("A")).property(P::int("B")));
    let (loaded, report) = load(&registry, ty, &bytes);

    assert!(report.is_clean());
    assert_eq!(get(&registry, &loaded, "A"), Value::Int(7));
    assert_eq!(get(&registry, &loaded, "B"), Value::Int(9));
}

#[test]
fn negative_tag_size_is_an_error() {
    let mut w = MemoryWriter::new();
    write_int_tag(&mut w, "A", 7, -1);
    terminate(&mut w);
    let bytes = w.into_bytes();

    let mut registry = TypeRegistry::new();
    let ty = register(&mut registry, TypeDef::class("Thing").property(P::int("A")));
    let env = Environment::new();
    let mut objects = ObjectTable::new();
    let mut ctx = SerializeContext::new(&registry, &env, &mut objects);
    let mut instance = registry.new_instance(ty);
    let mut r = MemoryReader::new(&bytes);

    let err = serialize_tagged(&mut ctx, &mut r, ty, instance.memory_mut(), None).unwrap_err();
    assert!(matches!(err, ReflectError::TagSize { size: -1, .. }));
}

#[test]
fn array_count_must_fit_its_tag() {
    let mut w = MemoryWriter::new();
    let mut tag = PropertyTag {
        name: Name::new("Members"),
        type_name: Name::new("ArrayProperty"),
        size: 0,
        array_index: 0,
        payload: TagPayload::None,
    };
    let placeholder = tag.serialize(&mut w).unwrap().unwrap();
    w.xfer_i32(&mut i32::MAX).unwrap();
    w.commit(placeholder, 4).unwrap();
    write_int_tag(&mut w, "Last", 1, 4);
    terminate(&mut w);
    let bytes = w.into_bytes();

    let mut registry = TypeRegistry::new();
    let ty = register(
        &mut registry,
        TypeDef::class("Team")
            .property(P::array("Members", P::object("Members")))
            .property(P::int("Last")),
    );
    let env = Environment::new();
    let mut objects = ObjectTable::new();
    let mut ctx = SerializeContext::new(&registry, &env, &mut objects);
    let mut instance = registry.new_instance(ty);
    let mut r = MemoryReader::new(&bytes);

    let err = serialize_tagged(&mut ctx, &mut r, ty, instance.memory_mut(), None).unwrap_err();
    insta::assert_snapshot!(err, @"element count 2147483647 for `Members` does not fit its data");
    assert_eq!(get(&registry, &instance, "Members"), Value::Array(Vec::new()));
}

#[cfg(feature = "editor-only-data")]
fn restricted_type(registry: &mut TypeRegistry) -> TypeId {
    register(
        registry,
        TypeDef::class("Light")
            .property(P::string("Note").flags(PropertyFlags::EDITOR_ONLY))
            .property(P::int("Shadows").flags(PropertyFlags::NOT_FOR_CONSOLE))
            .property(P::int("Power")),
    )
}

#[cfg(feature = "editor-only-data")]
fn restricted_instance(registry: &TypeRegistry, ty: TypeId) -> Instance {
    let mut instance = registry.new_instance(ty);
    set(registry, &mut instance, "Note", Value::Str("check".to_owned()));
    set(registry, &mut instance, "Shadows", Value::Int(2));
    set(registry, &mut instance, "Power", Value::Int(60));
    instance
}

#[cfg(feature = "editor-only-data")]
#[test]
fn console_excludes_restricted_properties() {
    let mut registry = TypeRegistry::new();
    let ty = restricted_type(&mut registry);
    let mut instance = restricted_instance(&registry, ty);
    let bytes = save(&registry, &mut instance);

    let console = Environment::new().console(true);
    let mut r = MemoryReader::new(&bytes);
    let (loaded, report) = load_from(&registry, &console, &mut r, ty);

    assert_eq!(report.count(SkipReason::BuildExcluded), 2);
    assert_eq!(report.skips.len(), 2);
    assert_eq!(get(&registry, &loaded, "Note"), Value::Str(String::new()));
    assert_eq!(get(&registry, &loaded, "Shadows"), Value::Int(0));
    assert_eq!(get(&registry, &loaded, "Power"), Value::Int(60));
}

#[cfg(feature = "editor-only-data")]
#[test]
fn filtered_save_drops_editor_only() {
    let mut registry = TypeRegistry::new();
    let ty = restricted_type(&mut registry);
    let mut instance = restricted_instance(&registry, ty);

    let mut w = MemoryWriter::new();
    save_into(&registry, &Environment::new().filter_editor_only(true), &mut w, &mut instance, None);
    insta::assert_snapshot!(describe(w.as_bytes()), @r"
    Shadows[0] IntProperty 4
    Power[0] IntProperty 4
    ");

    let mut w = MemoryWriter::new().with_flags(ArchiveFlags::FILTER_EDITOR_ONLY);
    save_into(&registry, &Environment::new(), &mut w, &mut instance, None);
    assert!(!describe(w.as_bytes()).contains("Note"));
}

fn transient_type(registry: &mut TypeRegistry) -> TypeId {
    register(
        registry,
        TypeDef::class("Cacheable")
            .property(P::int("Cache").flags(PropertyFlags::TRANSIENT))
            .property(P::int("Keep")),
    )
}

#[test]
fn transient_is_not_persisted() {
    let mut registry = TypeRegistry::new();
    let ty = transient_type(&mut registry);
    let mut instance = registry.new_instance(ty);
    set(&registry, &mut instance, "Cache", Value::Int(5));
    set(&registry, &mut instance, "Keep", Value::Int(6));

    let mut w = MemoryWriter::new().with_flags(ArchiveFlags::PERSISTENT);
    save_into(&registry, &Environment::new(), &mut w, &mut instance, None);
    insta::assert_snapshot!(describe(w.as_bytes()), @"Keep[0] IntProperty 4");

    let bytes = save(&registry, &mut instance);
    insta::assert_snapshot!(describe(&bytes), @r"
    Cache[0] IntProperty 4
    Keep[0] IntProperty 4
    ");

    let mut r = MemoryReader::new(&bytes).with_flags(ArchiveFlags::PERSISTENT);
    let (loaded, report) = load_from(&registry, &Environment::new(), &mut r, ty);
    assert_eq!(report.count(SkipReason::NotSerializable), 1);
    assert_eq!(get(&registry, &loaded, "Cache"), Value::Int(0));
    assert_eq!(get(&registry, &loaded, "Keep"), Value::Int(6));
}

#[test]
fn deprecated_loads_but_is_not_saved() {
    let mut writer = TypeRegistry::new();
    let ty = register(&mut writer, TypeDef::class("Score").property(P::int("Old")).property(P::int("New")));
    let mut instance = writer.new_instance(ty);
    set(&writer, &mut instance, "Old", Value::Int(1));
    set(&writer, &mut instance, "New", Value::Int(2));
    let bytes = save(&writer, &mut instance);

    let mut reader = TypeRegistry::new();
    let ty = register(
        &mut reader,
        TypeDef::class("Score")
            .property(P::int("Old").flags(PropertyFlags::DEPRECATED))
            .property(P::int("New")),
    );
    let (mut loaded, report) = load(&reader, ty, &bytes);
    assert!(report.is_clean());
    assert_eq!(get(&reader, &loaded, "Old"), Value::Int(1));

    let resaved = save(&reader, &mut loaded);
    insta::assert_snapshot!(describe(&resaved), @"New[0] IntProperty 4");
}

#[test]
fn immutable_struct_is_written_natively() {
    let mut registry = TypeRegistry::new();
    let guid = register(
        &mut registry,
        TypeDef::structure("Guid")
            .struct_flags(StructFlags::IMMUTABLE)
            .property(P::int("A"))
            .property(P::int("B"))
            .property(P::int("C"))
            .property(P::int("D")),
    );
    let ty = register(&mut registry, TypeDef::class("Asset").property(P::structure("Id", guid)));

    let id = Value::Struct(vec![Value::Int(1), Value::Int(0), Value::Int(3), Value::Int(4)]);
    let mut instance = registry.new_instance(ty);
    set(&registry, &mut instance, "Id", id.clone());
    let bytes = save(&registry, &mut instance);

    insta::assert_snapshot!(describe(&bytes), @"Id[0] StructProperty 16");
    let (loaded, _) = load(&registry, ty, &bytes);
    assert_eq!(get(&registry, &loaded, "Id"), id);
}

fn color_struct(registry: &mut TypeRegistry, name: &str, flags: StructFlags) -> TypeId {
    register(
        registry,
        TypeDef::structure(name)
            .struct_flags(flags)
            .property(P::byte("R"))
            .property(P::byte("G"))
            .property(P::byte("B"))
            .property(P::byte("A")),
    )
}

fn saved_tint(registry: &mut TypeRegistry, color: TypeId) -> Vec<u8> {
    let ty = register(registry, TypeDef::class("Paint").property(P::structure("Tint", color)));
    let rgba = |a| Value::Struct(vec![Value::Byte(1), Value::Byte(2), Value::Byte(3), Value::Byte(a)]);

    let mut defaults = registry.new_instance(ty);
    set(registry, &mut defaults, "Tint", rgba(4));
    let mut instance = registry.new_instance(ty);
    set(registry, &mut instance, "Tint", rgba(5));

    let mut w = MemoryWriter::new();
    save_into(registry, &Environment::new(), &mut w, &mut instance, Some(&defaults));
    w.into_bytes()
}

#[test]
fn nested_struct_is_diffed_against_defaults() {
    let mut registry = TypeRegistry::new();
    let color = color_struct(&mut registry, "LinearColor", StructFlags::NONE);
    let bytes = saved_tint(&mut registry, color);
    assert_eq!(nested_fields(&bytes), ["A"]);
}

#[test]
fn atomic_struct_writes_every_field() {
    let mut registry = TypeRegistry::new();
    let color = color_struct(&mut registry, "Color", StructFlags::ATOMIC);
    let bytes = saved_tint(&mut registry, color);
    assert_eq!(nested_fields(&bytes), ["R", "G", "B", "A"]);
}

#[test]
fn relocatable_references_use_indices() {
    let mut registry = TypeRegistry::new();
    let ty = register(
        &mut registry,
        TypeDef::class("Link").property(P::object("From")).property(P::object("To")),
    );
    let target = ObjectHandle(0x1000);
    let mut instance = registry.new_instance(ty);
    set(&registry, &mut instance, "From", Value::Object(target));
    set(&registry, &mut instance, "To", Value::Object(target));

    let env = Environment::new();
    let mut objects = ObjectTable::new();
    let mut w = MemoryWriter::new();
    {
        let mut ctx = SerializeContext::new(&registry, &env, &mut objects).pass(PassMode::Relocatable);
        serialize_tagged(&mut ctx, &mut w, ty, instance.memory_mut(), None).unwrap();
    }
    assert_eq!(objects.len(), 1);
    insta::assert_snapshot!(describe(w.as_bytes()), @r"
    From[0] ObjectProperty 4
    To[0] ObjectProperty 4
    ");

    let bytes = w.into_bytes();
    let mut loaded = registry.new_instance(ty);
    let mut r = MemoryReader::new(&bytes);
    let mut ctx = SerializeContext::new(&registry, &env, &mut objects).pass(PassMode::Relocatable);
    serialize_tagged(&mut ctx, &mut r, ty, loaded.memory_mut(), None).unwrap();
    assert_eq!(get(&registry, &loaded, "To"), Value::Object(target));
}

#[test]
fn references_are_collected_once() {
    let mut registry = TypeRegistry::new();
    let aim = register(&mut registry, TypeDef::structure("Aim").property(P::object("Target")));
    let ty = register(
        &mut registry,
        TypeDef::class("Squad")
            .property(P::int("Size"))
            .property(P::object("Leader"))
            .property(P::structure("Focus", aim))
            .property(P::array("Members", P::object("Members"))),
    );

    let mut instance = registry.new_instance(ty);
    set(&registry, &mut instance, "Leader", Value::Object(ObjectHandle(0x10)));
    set(&registry, &mut instance, "Focus", Value::Struct(vec![Value::Object(ObjectHandle(0x20))]));
    set(
        &registry,
        &mut instance,
        "Members",
        Value::Array(vec![
            Value::Object(ObjectHandle(0x10)),
            Value::Object(ObjectHandle::NULL),
            Value::Object(ObjectHandle(0x30)),
        ]),
    );

    let refs = collect_references(&registry, ty, instance.memory());
    assert_eq!(refs, [ObjectHandle(0x10), ObjectHandle(0x20), ObjectHandle(0x30)]);
}

#[test]
fn instantiate_copies_owned_values() {
    let mut registry = TypeRegistry::new();
    let ty = register(
        &mut registry,
        TypeDef::class("Book")
            .property(P::string("Title"))
            .property(P::array("Pages", P::int("Pages")))
            .property(P::int("Year")),
    );
    let mut defaults = registry.new_instance(ty);
    set(&registry, &mut defaults, "Title", Value::Str("Draft".to_owned()));
    set(&registry, &mut defaults, "Pages", Value::Array(vec![Value::Int(1), Value::Int(2)]));
    set(&registry, &mut defaults, "Year", Value::Int(1999));
    registry.set_defaults(ty, defaults);

    let mut instance = registry.instantiate(ty).unwrap();
    assert_eq!(get(&registry, &instance, "Year"), Value::Int(1999));
    assert_eq!(get(&registry, &instance, "Pages"), Value::Array(vec![Value::Int(1), Value::Int(2)]));

    set(&registry, &mut instance, "Title", Value::Str("Final".to_owned()));
    let defaults = registry.default_instance(ty).unwrap();
    assert_eq!(get(&registry, defaults, "Title"), Value::Str("Draft".to_owned()));
    assert_eq!(get(&registry, &instance, "Title"), Value::Str("Final".to_owned()));
}

#[test]
fn field_access_errors() {
    let mut registry = TypeRegistry::new();
    let ty = register(&mut registry, TypeDef::class("Box").property(P::int("Width").array_dim(2)));
    let mut instance = registry.new_instance(ty);

    let err = registry.get_value(&instance, "Height", 0).unwrap_err();
    insta::assert_snapshot!(err, @"type `Box` has no field `Height`");

    let err = registry.get_value(&instance, "Width", 2).unwrap_err();
    insta::assert_snapshot!(err, @"index 2 out of bounds for `Width` of dimension 2");

    let err = registry.set_value(&mut instance, "Width", 0, &Value::Float(1.0)).unwrap_err();
    insta::assert_snapshot!(err, @"value for `Width` must be an int");
}

fn reload(registry: &TypeRegistry, instance: &mut Instance, bytes: &[u8]) {
    let env = Environment::new();
    let mut objects = ObjectTable::new();
    let mut ctx = SerializeContext::new(registry, &env, &mut objects);
    let ty = instance.type_id();
    let mut r = MemoryReader::new(bytes);
    let report = serialize_tagged(&mut ctx, &mut r, ty, instance.memory_mut(), None).unwrap();
    assert!(report.is_clean());
    assert_eq!(r.remaining(), 0);
}

#[test]
fn reloading_arrays_reuses_heap_slots() {
    let mut registry = TypeRegistry::new();
    let label = register(
        &mut registry,
        TypeDef::structure("Label").property(P::string("Text")).property(P::name("Tag")),
    );
    let ty = register(
        &mut registry,
        TypeDef::class("Board")
            .property(P::array("Notes", P::string("Notes")))
            .property(P::array("Labels", P::structure("Labels", label))),
    );
    let label_value = |text: &str, tag: &str| Value::Struct(vec![Value::Str(text.to_owned()), Value::Name(Name::new(tag))]);

    let mut full = registry.new_instance(ty);
    let notes = Value::Array(vec![Value::Str("a".to_owned()), Value::Str("b".to_owned())]);
    let labels = Value::Array(vec![label_value("x", "Red"), label_value("y", "Blue")]);
    set(&registry, &mut full, "Notes", notes.clone());
    set(&registry, &mut full, "Labels", labels.clone());
    let full_bytes = save(&registry, &mut full);

    let mut short = registry.new_instance(ty);
    let one_note = Value::Array(vec![Value::Str("c".to_owned())]);
    set(&registry, &mut short, "Notes", one_note.clone());
    let short_bytes = save(&registry, &mut short);

    let mut instance = registry.new_instance(ty);
    reload(&registry, &mut instance, &full_bytes);
    let slots = instance.heap().len();

    reload(&registry, &mut instance, &full_bytes);
    assert_eq!(instance.heap().len(), slots);
    assert_eq!(instance.heap().free_len(), 0);
    assert_eq!(get(&registry, &instance, "Notes"), notes);
    assert_eq!(get(&registry, &instance, "Labels"), labels);

    reload(&registry, &mut instance, &short_bytes);
    assert_eq!(instance.heap().len(), slots);
    assert_eq!(get(&registry, &instance, "Notes"), one_note);
    assert_eq!(get(&registry, &instance, "Labels"), labels);

    reload(&registry, &mut instance, &full_bytes);
    assert_eq!(instance.heap().len(), slots);
    assert_eq!(get(&registry, &instance, "Notes"), notes);
}
