use std::path::{Path, PathBuf};

use pgtap_harness::{discover_test_scripts, HarnessResult, JsonPathExtractor, ProjectTestDir};
use pretty_assertions::assert_eq;

fn example_project() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/example_project")
}

#[test]
fn test_example_project_discovers_only_qualifying_scripts() -> anyhow::Result<()> {
    let project = ProjectTestDir::resolve(example_project())?;

    let names: Vec<String> = project
        .script_list()?
        .into_iter()
        .map(|path| {
            path.strip_prefix(project.test_dir())
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();

    assert_eq!(
        names,
        vec![
            "ddl/test_b.sql",
            "ddl/test_hello_world.sql",
            "dml/test_c.sql",
            "dml/test_copy_json.sql",
        ]
    );
    Ok(())
}

#[test]
fn test_discovery_iterator_can_be_walked_twice() -> anyhow::Result<()> {
    let test_dir = example_project().join("test");

    let first: Vec<PathBuf> = discover_test_scripts(&test_dir)?.collect::<HarnessResult<_>>()?;
    let second: Vec<PathBuf> = discover_test_scripts(&test_dir)?.collect::<HarnessResult<_>>()?;

    assert_eq!(first.len(), 4);
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_example_fixture_rows_extract_in_column_order() -> anyhow::Result<()> {
    let root = example_project();
    let extractor = JsonPathExtractor::from_file(&root.join("data/events_jsonpaths.json"))?;
    let data = std::fs::read_to_string(root.join("data/events.json"))?;

    let rows = data
        .lines()
        .map(|line| extractor.extract(line))
        .collect::<HarnessResult<Vec<_>>>()?;

    assert_eq!(
        rows,
        vec![
            vec![
                Some("1".to_string()),
                Some("signup".to_string()),
                Some(r#"{"plan":"free"}"#.to_string()),
            ],
            vec![
                Some("2".to_string()),
                Some("upgrade".to_string()),
                Some(r#"{"plan":"pro"}"#.to_string()),
            ],
            vec![Some("3".to_string()), None, None],
        ]
    );
    Ok(())
}
