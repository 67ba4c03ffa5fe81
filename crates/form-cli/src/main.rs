mod templates;

use clap::{Parser, Subcommand, ValueEnum};
use form_engine::{
    CachingFetcher, DefaultEvaluator, FieldTypeRegistry, Form, FormEngine, TemplateEngine,
    ValidationResult, build_render_payload, render_html, render_json_ui, render_text, validate,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use templates::DirFetcher;
use tracing::debug;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Dynamic form CLI",
    long_about = "Renders form schemas against a model and checks schemas for authoring mistakes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
    Html,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a form against a model and print the result.
    Render {
        /// Path to the form JSON.
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
        /// JSON file holding the model the form binds to.
        #[arg(long, value_name = "MODEL")]
        model: Option<PathBuf>,
        /// Directory field templates are read from (defaults to the embedded templates).
        #[arg(long, value_name = "DIR", env = "DZ_FORMS_TEMPLATES")]
        templates: Option<PathBuf>,
        /// Output format.
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
        /// Render every field disabled.
        #[arg(long)]
        disabled: bool,
    },
    /// Check a form for duplicate names, unknown types and broken expressions.
    Check {
        /// Path to the form JSON.
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
    },
    /// Print the JSON Schema of the form format.
    Schema,
    /// List the built-in field types and their templates.
    Types,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Render {
            form,
            model,
            templates,
            format,
            disabled,
        } => run_render(form, model, templates, format, disabled).await,
        Command::Check { form } => run_check(form),
        Command::Schema => run_schema(),
        Command::Types => run_types(),
    }
}

async fn run_render(
    form_path: PathBuf,
    model_path: Option<PathBuf>,
    template_dir: Option<PathBuf>,
    format: RenderMode,
    disabled: bool,
) -> CliResult<()> {
    let form: Form = read_json(&form_path)?;
    let mut builder = FormEngine::builder(form).registry(FieldTypeRegistry::with_builtin_fields());
    if let Some(path) = model_path {
        builder = builder.model(read_json::<Value>(&path)?);
    }
    let mut engine = builder.build()?;
    engine.set_disabled(disabled);

    match template_dir {
        Some(dir) => {
            debug!(dir = %dir.display(), "using template directory");
            engine.settle(&CachingFetcher::new(DirFetcher::new(dir))).await?;
        }
        None => engine.settle(&templates::embedded()).await?,
    }

    let payload = build_render_payload(&engine, &TemplateEngine::new())?;
    match format {
        RenderMode::Text => println!("{}", render_text(&payload)),
        RenderMode::Json => println!(
            "{}",
            serde_json::to_string_pretty(&render_json_ui(&payload))?
        ),
        RenderMode::Html => println!("{}", render_html(&payload)),
    }
    Ok(())
}

fn run_check(form_path: PathBuf) -> CliResult<()> {
    let form: Form = read_json(&form_path)?;
    let registry = FieldTypeRegistry::with_builtin_fields();
    let result = validate(&form, &registry, &DefaultEvaluator);
    println!("{}", serde_json::to_string_pretty(&result)?);
    describe_validation(&result);

    if result.valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_validation(result: &ValidationResult) {
    for issue in &result.issues {
        eprintln!("  {} [{}] {}", issue.path, issue.code, issue.message);
    }
}

fn run_schema() -> CliResult<()> {
    let schema = schemars::schema_for!(Form);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn run_types() -> CliResult<()> {
    let registry = FieldTypeRegistry::with_builtin_fields();
    println!("{}", serde_json::to_string_pretty(&registry.list())?);
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use serde_json::{Value, json};
    use std::fs;

    fn write_json(dir: &assert_fs::TempDir, name: &str, value: &Value) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    fn profile() -> Value {
        json!({
            "title": "Profile",
            "fields": [
                { "name": "name", "type": "text", "label": "Name", "required": "true" },
                {
                    "name": "color",
                    "type": "select",
                    "options": ["red", "green"],
                    "visible": "name.value !== null"
                },
                {
                    "name": "address",
                    "type": "form",
                    "fields": [
                        { "name": "city", "type": "text", "value": "{{ $parent.name.value }}'s city" }
                    ]
                }
            ]
        })
    }

    #[test]
    fn render_prints_json_payload() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;
        let form = write_json(&workspace, "form.json", &profile());
        let model = write_json(&workspace, "model.json", &json!({ "name": "Ada", "color": "green" }));

        let output = Command::cargo_bin("dz-forms")?
            .arg("render")
            .arg("--form")
            .arg(&form)
            .arg("--model")
            .arg(&model)
            .arg("--format")
            .arg("json")
            .env_remove("DZ_FORMS_TEMPLATES")
            .output()?;
        assert!(output.status.success());

        let ui: Value = serde_json::from_slice(&output.stdout)?;
        assert_eq!(ui["title"], "Profile");
        assert_eq!(ui["fields"][0]["required"], true);
        assert_eq!(ui["fields"][1]["visible"], true);
        assert_eq!(ui["fields"][1]["mount"], "mounted");
        let markup = ui["fields"][1]["markup"].as_str().expect("select markup");
        assert!(markup.contains("<option value=\"green\" selected>green</option>"));
        let city = &ui["fields"][2]["fields"][0];
        assert_eq!(city["derived_value"], "Ada's city");
        Ok(())
    }

    #[test]
    fn render_html_uses_template_directory() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;
        let form = write_json(&workspace, "form.json", &profile());
        let model = write_json(&workspace, "model.json", &json!({}));
        let templates = workspace.path().join("templates");
        fs::create_dir_all(templates.join("fields"))?;
        fs::write(templates.join("fields/text.tpl.html"), "<x-text name=\"{{name}}\">")?;

        let output = Command::cargo_bin("dz-forms")?
            .arg("render")
            .arg("--form")
            .arg(&form)
            .arg("--model")
            .arg(&model)
            .arg("--format")
            .arg("html")
            .env("DZ_FORMS_TEMPLATES", &templates)
            .output()?;
        assert!(output.status.success());

        let html = String::from_utf8(output.stdout)?;
        assert!(html.contains("<x-text name=\"name\">"));
        assert!(html.contains("<div class=\"dz-field\" data-field=\"color\" hidden></div>"));
        assert!(!html.contains("dz-sub-form"));
        Ok(())
    }

    #[test]
    fn render_without_model_fails() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;
        let form = write_json(&workspace, "form.json", &profile());

        let output = Command::cargo_bin("dz-forms")?
            .arg("render")
            .arg("--form")
            .arg(&form)
            .output()?;
        assert!(!output.status.success());
        assert!(String::from_utf8(output.stderr)?.contains("MissingModel"));
        Ok(())
    }

    #[test]
    fn check_reports_issues() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;
        let form = write_json(
            &workspace,
            "form.json",
            &json!({
                "fields": [
                    { "name": "a", "type": "text" },
                    { "name": "a", "type": "stars" }
                ]
            }),
        );

        let output = Command::cargo_bin("dz-forms")?
            .arg("check")
            .arg("--form")
            .arg(&form)
            .output()?;
        assert!(!output.status.success());
        let result: Value = serde_json::from_slice(&output.stdout)?;
        assert_eq!(result["valid"], false);
        let codes: Vec<&str> = result["issues"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|issue| issue["code"].as_str())
            .collect();
        assert_eq!(codes, vec!["duplicate_name", "unknown_type"]);
        Ok(())
    }

    #[test]
    fn check_accepts_valid_forms() -> Result<(), Box<dyn std::error::Error>> {
        let workspace = assert_fs::TempDir::new()?;
        let form = write_json(&workspace, "form.json", &profile());
        Command::cargo_bin("dz-forms")?
            .arg("check")
            .arg("--form")
            .arg(&form)
            .assert()
            .success();
        Ok(())
    }

    #[test]
    fn types_lists_builtin_templates() -> Result<(), Box<dyn std::error::Error>> {
        let output = Command::cargo_bin("dz-forms")?.arg("types").output()?;
        assert!(output.status.success());
        let types: Value = serde_json::from_slice(&output.stdout)?;
        assert_eq!(types["select"]["templateUrl"], "fields/select.tpl.html");
        assert_eq!(types.as_object().map(|types| types.len()), Some(9));
        Ok(())
    }

    #[test]
    fn schema_describes_fields() -> Result<(), Box<dyn std::error::Error>> {
        let output = Command::cargo_bin("dz-forms")?.arg("schema").output()?;
        assert!(output.status.success());
        let schema: Value = serde_json::from_slice(&output.stdout)?;
        assert_eq!(schema["title"], "Form");
        assert!(schema["properties"]["fields"].is_object());
        Ok(())
    }
}
