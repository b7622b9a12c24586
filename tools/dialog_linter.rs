/// Dialog Linter — validates a course's gamification content.
///
/// Usage: dialog_linter <course_dir> [--static-dir <dir>]
///
/// Without `--static-dir` the course is only checked; with it the compiled
/// dialogs and `gaming.json` are written out as well.

use gamification_engine::core::compiler::{CourseCompiler, CourseTree, ModuleTree};
use gamification_engine::core::config::GamingConfig;
use gamification_engine::core::hero::HeroRegistry;
use std::collections::BTreeMap;
use std::path::Path;
use std::process;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: dialog_linter <course_dir> [--static-dir <dir>]");
        process::exit(0);
    }

    let course_dir = Path::new(&args[1]);
    let mut static_dir = None;

    let mut i = 2;
    while i < args.len() {
        if args[i] == "--static-dir" && i + 1 < args.len() {
            i += 1;
            static_dir = Some(args[i].clone());
        }
        i += 1;
    }

    if !course_dir.is_dir() {
        eprintln!("ERROR: Path '{}' does not exist", course_dir.display());
        process::exit(1);
    }

    let config = match GamingConfig::load(course_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: Failed to load gaming-config.json: {}", e);
            process::exit(1);
        }
    };
    println!(
        "Loaded config: {} variables, {} achievements",
        config.variables().len(),
        config.achievements().len()
    );

    let heroes = match HeroRegistry::load(course_dir) {
        Ok(heroes) => heroes,
        Err(e) => {
            eprintln!("ERROR: Failed to load hero/config.json: {}", e);
            process::exit(1);
        }
    };
    println!("Default hero: {}", heroes.default_hero());

    let tree = discover_tree(course_dir);
    println!("Found {} modules", tree.modules.len());

    let compiler = CourseCompiler::new(&config, &heroes);
    let result = match &static_dir {
        Some(dir) => compiler.compile(&tree, Path::new(dir)),
        None => compiler.check(&tree),
    };

    println!("\n=== Dialog Lint Report ===\n");

    match result {
        Ok(manifest) => {
            for action in &manifest.actions {
                println!("  {} -> {}", action.event, action.path);
            }
            println!("\nAll checks passed! {} dialogs", manifest.actions.len());
            if let Some(dir) = static_dir {
                println!("Wrote static files to {}", dir);
            }
            process::exit(0);
        }
        Err(e) => {
            println!("ERROR: {}", e);
            process::exit(1);
        }
    }
}

/// Course layout convention: `course/` for course-level files, `modules/N/`
/// for module-level, `modules/N/lessons/M/` for lesson-level. Non-numeric
/// directory names are skipped.
fn discover_tree(root: &Path) -> CourseTree {
    let mut tree = CourseTree {
        course_dir: root.join("course"),
        modules: BTreeMap::new(),
    };

    if let Ok(entries) = std::fs::read_dir(root.join("modules")) {
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(num) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            if !path.is_dir() {
                continue;
            }

            let mut module = ModuleTree {
                module_dir: path.clone(),
                lessons: BTreeMap::new(),
            };
            if let Ok(lessons) = std::fs::read_dir(path.join("lessons")) {
                for lesson in lessons.flatten() {
                    let lesson_path = lesson.path();
                    if let Some(lesson_num) = lesson_path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .and_then(|n| n.parse::<u32>().ok())
                    {
                        if lesson_path.is_dir() {
                            module.lessons.insert(lesson_num, lesson_path);
                        }
                    }
                }
            }
            tree.modules.insert(num, module);
        }
    }
    tree
}
