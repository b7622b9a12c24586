use gamification_engine::core::compiler::{CompileError, CourseCompiler, CourseTree, ModuleTree};
use gamification_engine::core::config::GamingConfig;
use gamification_engine::core::hero::HeroRegistry;
use gamification_engine::core::parser::DialogError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

fn fixture_root() -> PathBuf {
    Path::new("tests/fixtures/demo_course").to_path_buf()
}

fn fixture_tree() -> CourseTree {
    let root = fixture_root();
    let mut lessons = BTreeMap::new();
    lessons.insert(1, root.join("modules/1/lessons/1"));
    lessons.insert(2, root.join("modules/1/lessons/2"));
    let mut modules = BTreeMap::new();
    modules.insert(
        1,
        ModuleTree {
            module_dir: root.join("modules/1"),
            lessons,
        },
    );
    CourseTree {
        course_dir: root.join("course"),
        modules,
    }
}

fn fixture_parts() -> (GamingConfig, HeroRegistry) {
    let root = fixture_root();
    (
        GamingConfig::load(&root).unwrap(),
        HeroRegistry::load(&root).unwrap(),
    )
}

#[test]
fn check_collects_actions_in_scan_order() {
    let (config, heroes) = fixture_parts();
    let compiler = CourseCompiler::new(&config, &heroes);
    let manifest = compiler.check(&fixture_tree()).unwrap();

    let events: Vec<String> = manifest
        .actions
        .iter()
        .map(|a| a.event.to_string())
        .collect();
    assert_eq!(
        events,
        [
            "onCourseStart()",
            "onModuleStart(1)",
            "onLessonStart(1, 1)",
            "onPointsRetrieve(score, 10)",
        ]
    );

    // paths are sequential and each one carries its resolved body
    let paths: Vec<&str> = manifest.actions.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(
        paths,
        ["dialog-0.json", "dialog-1.json", "dialog-2.json", "dialog-3.json"]
    );
    for path in paths {
        assert!(manifest.dialog(path).is_some());
    }

    assert_eq!(manifest.variables, ["score", "stars"]);
    assert_eq!(manifest.achievements.len(), 2);
}

#[test]
fn compile_writes_static_files() {
    let (config, heroes) = fixture_parts();
    let compiler = CourseCompiler::new(&config, &heroes);
    let static_dir = std::env::temp_dir().join("gamification-compile-out");
    let _ = fs::remove_dir_all(&static_dir);

    let manifest = compiler.compile(&fixture_tree(), &static_dir).unwrap();

    let gaming: Value =
        serde_json::from_str(&fs::read_to_string(static_dir.join("gaming.json")).unwrap())
            .unwrap();
    let actions = gaming["actions"].as_array().unwrap();
    assert_eq!(actions.len(), 4);
    assert_eq!(actions[0]["event"], "onCourseStart()");
    assert_eq!(actions[0]["type"], "dialog");
    assert_eq!(gaming["variables"], serde_json::json!(["score", "stars"]));
    assert_eq!(gaming["achievements"][0]["name"], "first_step");

    for action in &manifest.actions {
        assert!(static_dir.join(&action.path).is_file());
    }

    // the lesson dialog is pre-resolved: emotion paths, branch order kept
    let lesson: Value =
        serde_json::from_str(&fs::read_to_string(static_dir.join("dialog-2.json")).unwrap())
            .unwrap();
    let nodes = lesson["dialog"].as_array().unwrap();
    assert_eq!(nodes[0]["emotionFilePath"], "/hero/robo/happy.png");
    assert!(nodes[0].get("emotion").is_none());
    let on = nodes[2]["condition"]["on"].as_object().unwrap();
    let keys: Vec<&str> = on.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, ["> 10", "else"]);
}

#[test]
fn compile_is_idempotent() {
    let (config, heroes) = fixture_parts();
    let compiler = CourseCompiler::new(&config, &heroes);
    let static_dir = std::env::temp_dir().join("gamification-compile-twice");
    let _ = fs::remove_dir_all(&static_dir);

    let first = compiler.compile(&fixture_tree(), &static_dir).unwrap();
    let second = compiler.compile(&fixture_tree(), &static_dir).unwrap();

    let first_paths: Vec<&String> = first.actions.iter().map(|a| &a.path).collect();
    let second_paths: Vec<&String> = second.actions.iter().map(|a| &a.path).collect();
    assert_eq!(first_paths, second_paths);
}

fn temp_course(tag: &str, dialog: &str) -> CourseTree {
    let root = std::env::temp_dir().join(format!("gamification-course-{}", tag));
    let _ = fs::remove_dir_all(&root);
    let course_dir = root.join("course");
    fs::create_dir_all(&course_dir).unwrap();
    fs::write(course_dir.join("bad-dialog.json"), dialog).unwrap();
    CourseTree {
        course_dir,
        modules: BTreeMap::new(),
    }
}

#[test]
fn lesson_event_outside_lesson_scope_is_fatal() {
    let (config, heroes) = fixture_parts();
    let compiler = CourseCompiler::new(&config, &heroes);
    let tree = temp_course(
        "scope",
        r#"{"event": "onLessonStart", "dialog": []}"#,
    );
    assert!(matches!(
        compiler.check(&tree),
        Err(CompileError::EventOutsideModule { .. })
    ));
}

#[test]
fn broken_reference_aborts_the_whole_compilation() {
    let (config, heroes) = fixture_parts();
    let compiler = CourseCompiler::new(&config, &heroes);
    let tree = temp_course(
        "badref",
        r#"{"event": "onCourseStart", "dialog": [{"giveAchievements": ["ghost"]}]}"#,
    );
    assert!(matches!(
        compiler.check(&tree),
        Err(CompileError::Dialog(DialogError::UnknownAchievement { .. }))
    ));
}

#[test]
fn unknown_event_is_fatal() {
    let (config, heroes) = fixture_parts();
    let compiler = CourseCompiler::new(&config, &heroes);
    let tree = temp_course("badevent", r#"{"event": "onBanana", "dialog": []}"#);
    assert!(matches!(
        compiler.check(&tree),
        Err(CompileError::BadEvent { .. })
    ));
}
