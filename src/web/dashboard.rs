use crate::grid::GridStateMap;

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Status page listing every tracked grid with a cancel button
pub fn render_status_page(grids: &GridStateMap) -> String {
    let rows = if grids.is_empty() {
        r#"<tr><td colspan="5" class="empty">No tracked grids</td></tr>"#.to_string()
    } else {
        grids
            .iter()
            .map(|(symbol, grid)| {
                let symbol = escape(symbol);
                format!(
                    r#"<tr>
                <td class="symbol">{symbol}</td>
                <td>{grid_ids}</td>
                <td>{sl}</td>
                <td>{tp_ids}</td>
                <td><button onclick="cancelGrid('{symbol}')">Cancel</button></td>
            </tr>"#,
                    grid_ids = escape(&grid.grid.join(", ")),
                    sl = grid.sl.as_deref().map(escape).unwrap_or_else(|| "-".into()),
                    tp_ids = escape(&grid.tp.join(", ")),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r##"<!DOCTYPE html>
<html>
<head>
    <title>Grid Status</title>
    <style>
        :root {{
            --bg-dark: #0d0d12;
            --bg-panel: #16161f;
            --border: #2a2a3a;
            --text-primary: #e6e6e6;
            --text-secondary: #9494a8;
            --sell: #ff3b69;
        }}

        body {{
            background: var(--bg-dark);
            color: var(--text-primary);
            font-family: 'Inter', sans-serif;
            margin: 2rem;
        }}

        table {{
            width: 100%;
            border-collapse: collapse;
            background: var(--bg-panel);
        }}

        th, td {{
            border-bottom: 1px solid var(--border);
            padding: 0.5rem 0.75rem;
            text-align: left;
            font-family: 'JetBrains Mono', monospace;
            font-size: 0.85rem;
        }}

        th {{ color: var(--text-secondary); font-weight: 500; }}
        .symbol {{ font-weight: 600; }}
        .empty {{ color: var(--text-secondary); text-align: center; }}

        button {{
            background: transparent;
            color: var(--sell);
            border: 1px solid var(--sell);
            border-radius: 4px;
            cursor: pointer;
        }}
    </style>
</head>
<body>
    <h1>Tracked grids ({count})</h1>
    <table>
        <thead>
            <tr><th>Symbol</th><th>Grid orders</th><th>Stop-loss</th><th>Take-profits</th><th></th></tr>
        </thead>
        <tbody>
            {rows}
        </tbody>
    </table>
    <script>
        async function cancelGrid(symbol) {{
            await fetch('/api/grids/' + encodeURIComponent(symbol), {{ method: 'DELETE' }});
            location.reload();
        }}
    </script>
</body>
</html>"##,
        count = grids.len(),
        rows = rows,
    )
}
