mod common;

use std::fs::File;
use std::path::Path;

use common::{assert_well_formed, contains, init_logger, read_class, stack_map_classes, write_class, ClassBuilder, MARKER};
use tempfile::TempDir;
use tolstr::codegen::defs::attribute_names::{RUNTIME_INVISIBLE_ANNOTATIONS, STACK_MAP_TABLE};
use tolstr::codegen::defs::STRING_CLASS;
use tolstr::codegen::{ClassfileWritable, Constant};
use tolstr::io::{FileSink, FileSource, JarFileSink, JarFileSource};
use tolstr::obfuscate::decoder_name;
use tolstr::{Config, Error, Processor, Seed};
use walkdir::WalkDir;

fn secret() -> Vec<u8> {
    ClassBuilder::new("app/Secret")
        .annotated(MARKER)
        .string_constant("KEY", "api-key-123")
        .string_method("greeting", "hello world")
        .bytes()
}

fn inner() -> Vec<u8> {
    ClassBuilder::new("app/Secret$Inner").nested_in("app/Secret").string_method("text", "inner text").bytes()
}

fn plain() -> Vec<u8> {
    ClassBuilder::new("app/Plain").string_constant("NAME", "plain name").string_method("text", "plain text").bytes()
}

fn populate(root: &Path) {
    write_class(root, "app/Secret", &secret());
    write_class(root, "app/Secret$Inner", &inner());
    write_class(root, "app/Plain", &plain());
    std::fs::write(root.join("app/config.txt"), b"key=value").unwrap();
}

fn fixed(seed: i32) -> Config {
    Config::default().with_seed(Seed::Fixed(seed))
}

/// Relative path and content of every file below `root`, sorted
fn tree(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = WalkDir::new(root)
        .into_iter()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            (relative, std::fs::read(entry.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

#[test]
fn test_directory_pipeline_hides_strings_of_marked_classes() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    populate(&input);

    let report = Processor::new(vec![input.clone()], vec![output.clone()], fixed(99)).process().unwrap();
    assert_eq!(report.seed, Some(99));
    assert_eq!(report.patched_classes, 2);
    assert_eq!(report.hidden_strings, 3);
    assert_eq!(report.decoder.as_deref(), Some("io/tolstr/Deobfuscator"));

    for name in ["app/Secret", "app/Secret$Inner"] {
        let bytes = std::fs::read(output.join(format!("{}.class", name))).unwrap();
        for text in ["hello world", "api-key-123", "inner text"] {
            assert!(!contains(&bytes, text.as_bytes()), "{} still contains {}", name, text);
        }
        assert!(!contains(&bytes, MARKER.as_bytes()), "{} still carries the marker", name);
    }
    let patched = read_class(&output, "app/Secret");
    assert!(patched.find_attribute(RUNTIME_INVISIBLE_ANNOTATIONS).is_none());
    assert_eq!(patched.fields[0].constant_value_index(&patched.constant_pool).unwrap(), None);

    // untouched content is copied byte for byte
    assert_eq!(std::fs::read(output.join("app/Plain.class")).unwrap(), plain());
    assert_eq!(std::fs::read(output.join("app/config.txt")).unwrap(), b"key=value");

    let decoder = read_class(&output, "io/tolstr/Deobfuscator");
    assert!(decoder.find_method("getString", "(J)Ljava/lang/String;").is_some());
}

#[test]
fn test_patched_classes_are_well_formed() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    populate(&input);
    let chooser = ClassBuilder::new("app/Chooser")
        .annotated(MARKER)
        .string_constant("DEFAULT", "fallback")
        .choose_method("choose", "left side", "right side")
        .build();
    let input_classes: Vec<String> = chooser
        .constant_pool
        .iter()
        .filter(|(_, constant)| matches!(constant, Constant::Class(_)))
        .map(|(index, _)| chooser.constant_pool.class_name(index).unwrap())
        .collect();
    assert!(!input_classes.iter().any(|name| name == STRING_CLASS));
    write_class(&input, "app/Chooser", &chooser.to_classfile_bytes());

    let report = Processor::new(vec![input], vec![output.clone()], fixed(21)).process().unwrap();
    assert_eq!(report.patched_classes, 3);

    for name in ["app/Secret", "app/Secret$Inner", "app/Chooser", "io/tolstr/Deobfuscator"] {
        assert_well_formed(&read_class(&output, name));
    }

    // both branches leave a String on the stack, so the join frame names it
    let patched = read_class(&output, "app/Chooser");
    let pool = &patched.constant_pool;
    let method = &patched.methods[patched.find_method("choose", "([Ljava/lang/String;I)Ljava/lang/String;").unwrap()];
    let code = method.code(pool).unwrap().unwrap();
    let frames = code.attributes.iter().find(|attribute| attribute.is_named(pool, STACK_MAP_TABLE)).unwrap();
    let named: Vec<String> =
        stack_map_classes(&frames.info).into_iter().map(|index| pool.class_name(index).unwrap()).collect();
    assert_eq!(named, vec![STRING_CLASS.to_string()]);
    let bytes = std::fs::read(output.join("app/Chooser.class")).unwrap();
    for text in ["left side", "right side", "fallback"] {
        assert!(!contains(&bytes, text.as_bytes()));
    }
}

#[test]
fn test_non_ascii_entry_names_are_copied() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    populate(&input);
    std::fs::create_dir_all(input.join("res")).unwrap();
    std::fs::write(input.join("res/naïve.md"), "bonjour".as_bytes()).unwrap();
    write_class(&input, "app/Café", &plain());

    let output = dir.path().join("out");
    let report = Processor::new(vec![input.clone()], vec![output.clone()], fixed(2)).process().unwrap();
    assert_eq!(report.patched_classes, 2);
    assert_eq!(std::fs::read(output.join("res/naïve.md")).unwrap(), b"bonjour");
    assert_eq!(std::fs::read(output.join("app/Café.class")).unwrap(), plain());

    let jar = dir.path().join("lib.jar");
    let mut sink = JarFileSink::create(&jar).unwrap();
    sink.create_file("res/naïve.md", b"bonjour").unwrap();
    sink.create_file("app/Secret.class", &secret()).unwrap();
    sink.flush().unwrap();
    sink.close();
    let jar_output = dir.path().join("jar-out/lib.jar");
    Processor::new(vec![jar], vec![jar_output.clone()], fixed(2)).process().unwrap();
    assert_eq!(JarFileSource::open(&jar_output).unwrap().read_file("res/naïve.md").unwrap(), b"bonjour");
}

#[test]
fn test_same_seed_gives_identical_output() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    populate(&input);
    for name in ["first", "second"] {
        let output = dir.path().join(name);
        Processor::new(vec![input.clone()], vec![output], fixed(-5)).process().unwrap();
    }
    assert_eq!(tree(&dir.path().join("first")), tree(&dir.path().join("second")));

    let output = dir.path().join("third");
    Processor::new(vec![input], vec![output.clone()], fixed(6)).process().unwrap();
    assert_ne!(tree(&dir.path().join("first")), tree(&output));
}

#[test]
fn test_jar_input_produces_jar_with_decoder() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("lib.jar");
    let output = dir.path().join("out/lib.jar");
    let mut sink = JarFileSink::create(&input).unwrap();
    sink.create_file("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n").unwrap();
    sink.create_directory("app").unwrap();
    sink.create_file("app/Secret.class", &secret()).unwrap();
    sink.create_file("app/Plain.class", &plain()).unwrap();
    sink.flush().unwrap();
    sink.close();

    let config = fixed(3).with_project_name(":lib");
    let report = Processor::new(vec![input], vec![output.clone()], config).process().unwrap();
    assert_eq!(report.patched_classes, 1);

    let jar = JarFileSource::open(&output).unwrap();
    let paths: Vec<String> = jar.entries().unwrap().into_iter().map(|entry| entry.path).collect();
    assert_eq!(
        paths,
        vec![
            "META-INF/MANIFEST.MF",
            "app",
            "app/Secret.class",
            "app/Plain.class",
            "io/tolstr/Deobfuscator$lib.class",
        ]
    );
    assert_eq!(jar.read_file("app/Plain.class").unwrap(), plain());
    assert!(!contains(&jar.read_file("app/Secret.class").unwrap(), b"hello world"));

    let mut archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
    for index in 0..archive.len() {
        let entry = archive.by_index(index).unwrap();
        let time = entry.last_modified();
        assert_eq!((time.year(), time.month(), time.day(), time.hour()), (1980, 1, 1, 0), "{}", entry.name());
    }
}

#[test]
fn test_disabled_run_copies_everything() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    populate(&input);
    let config = Config { enabled: false, ..Config::default() };
    let report = Processor::new(vec![input.clone()], vec![output.clone()], config).process().unwrap();
    assert_eq!(report.seed, None);
    assert_eq!(report.decoder, None);
    assert_eq!(tree(&input), tree(&output));
}

#[test]
fn test_decoder_output_directory() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    let decoders = dir.path().join("generated");
    populate(&input);
    let config = Config { decoder_output: Some(decoders.clone()), ..fixed(1) };
    Processor::new(vec![input], vec![output.clone()], config).process().unwrap();
    assert!(decoders.join("io/tolstr/Deobfuscator.class").exists());
    assert!(!output.join("io/tolstr/Deobfuscator.class").exists());
}

#[test]
fn test_subprojects_are_patched_only_when_included() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let module = dir.path().join("module");
    write_class(&input, "app/Plain", &plain());
    write_class(&module, "app/Secret", &secret());

    for include in [false, true] {
        let suffix = if include { "included" } else { "excluded" };
        let output = dir.path().join(format!("out-{}", suffix));
        let module_output = dir.path().join(format!("module-{}", suffix));
        let config = Config { include_subprojects: include, ..fixed(8) };
        let report = Processor::new(vec![input.clone()], vec![output], config)
            .with_subprojects(vec![module.clone()], vec![module_output.clone()])
            .process()
            .unwrap();
        let bytes = std::fs::read(module_output.join("app/Secret.class")).unwrap();
        if include {
            assert_eq!(report.patched_classes, 1);
            assert!(!contains(&bytes, b"hello world"));
        } else {
            assert_eq!(report.patched_classes, 0);
            assert_eq!(bytes, secret());
        }
    }
}

#[test]
fn test_enclosing_class_on_classpath_puts_nested_class_in_scope() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let library = dir.path().join("lib");
    write_class(&input, "app/Secret$Inner", &inner());
    write_class(&library, "app/Secret", &secret());

    let output = dir.path().join("out");
    let report = Processor::new(vec![input.clone()], vec![output.clone()], fixed(4))
        .with_classpath(vec![library])
        .process()
        .unwrap();
    assert_eq!(report.patched_classes, 1);
    assert!(!contains(&std::fs::read(output.join("app/Secret$Inner.class")).unwrap(), b"inner text"));

    // without the enclosing class the nested one stays out of scope
    let output = dir.path().join("alone");
    let report = Processor::new(vec![input], vec![output], fixed(4)).process().unwrap();
    assert_eq!(report.patched_classes, 0);
}

#[test]
fn test_seed_from_inputs_is_stable() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    populate(&input);
    let config = Config::default().with_seed(Seed::FromInputs);
    let first = Processor::new(vec![input.clone()], vec![dir.path().join("a")], config.clone()).process().unwrap();
    let second = Processor::new(vec![input], vec![dir.path().join("b")], config).process().unwrap();
    assert!(first.seed.is_some());
    assert_eq!(first.seed, second.seed);
    assert_eq!(tree(&dir.path().join("a")), tree(&dir.path().join("b")));
}

#[test]
fn test_analysis_lists_constants_of_marked_classes() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    populate(&input);
    let result = Processor::new(vec![input], Vec::new(), Config::default()).analyze().unwrap();
    let names: Vec<&String> = result.configurations_by_type.keys().collect();
    assert_eq!(names, vec!["app/Secret"]);
    let configuration = result.get("app/Secret").unwrap();
    assert_eq!(
        configuration.constant_strings_by_field_name.get("KEY"),
        Some(&"api-key-123".encode_utf16().collect::<Vec<u16>>())
    );
}

#[test]
fn test_mismatched_outputs_are_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    populate(&input);
    let result = Processor::new(vec![input], Vec::new(), fixed(1)).process();
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[test]
fn test_decoder_names_keep_projects_apart() {
    let names = [decoder_name(""), decoder_name(":app"), decoder_name(":lib"), decoder_name(":app:feature")];
    for (index, name) in names.iter().enumerate() {
        assert!(name.starts_with("io/tolstr/Deobfuscator"));
        assert!(!names[index + 1..].contains(name), "{} is not unique", name);
    }
}
