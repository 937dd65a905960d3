//! `proctor tools`: List tools from all configured sources.

use proctor_core::tool::ToolDescriptor;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let router = proctor_tools::router_from_config(&config, None);

    let listed = router.list_tools().await;
    router.disconnect_all().await;
    let tools = listed?;

    println!("{}", render(&tools));
    Ok(())
}

fn render(tools: &[ToolDescriptor]) -> String {
    if tools.is_empty() {
        return "No tools available.".to_string();
    }
    let width = tools.iter().map(|t| t.name.len()).max().unwrap_or(0);
    let mut lines = vec![format!("{} tool(s):", tools.len())];
    for tool in tools {
        let summary = tool.description.lines().next().unwrap_or_default();
        lines.push(format!("  {:<width$}  {}", tool.name, summary));
    }
    lines.join("\n")
}
