use chrono::{DateTime, Utc};
use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

use crate::models::tool::Tool;

const BEHAVIOR_TEMPLATE: &str = include_str!("prompts/system.md");

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

#[derive(Serialize)]
struct BehaviorContext<'a> {
    date: String,
    tools: &'a [Tool],
}

/// Render the behavior template for the tools offered on this request
pub fn behavior_template(tools: &[Tool], now: DateTime<Utc>) -> Result<String, TeraError> {
    let context = BehaviorContext {
        date: now.format("%A, %B %-d, %Y").to_string(),
        tools,
    };
    load_prompt(BEHAVIOR_TEMPLATE, &context)
}
