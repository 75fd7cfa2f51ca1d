use anyhow::Result;

fn main() -> Result<()> {
    let schema = vinai_capture::Config::json_schema();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
