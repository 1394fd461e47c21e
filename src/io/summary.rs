use anyhow::Result;

use crate::ctx::Ctx;
use crate::diagnosis::failed_tests;

pub fn format_summary(ctx: &Ctx) -> Result<String> {
    let version = env!("CARGO_PKG_VERSION");
    let store = ctx.store()?;

    let mut out = String::new();
    out.push_str(&format!("kira-fliprqc v{}\n", version));
    out.push_str(&format!(
        "Plate: {} wells ({} labeled), {} frames @ {}s\n",
        store.len(),
        store.labeled_count(),
        store.frame_count(),
        store.frame_interval()
    ));

    let failed = failed_tests(&ctx.qc_results);
    if failed.is_empty() {
        out.push_str(&format!("QC: pass ({} tests)\n", ctx.qc_results.len()));
    } else {
        out.push_str(&format!("QC: FAIL ({})\n", failed.join(", ")));
    }

    if ctx.verdicts.is_empty() {
        out.push_str("Diagnosis: none\n");
    } else {
        out.push_str("Diagnosis:\n");
        for v in ctx.verdicts.values() {
            let value = v
                .normalized_value
                .map(|x| format!("{:.2}%", x))
                .unwrap_or_else(|| "NA".to_string());
            out.push_str(&format!(
                "  {}\t{}\t{}\t{}\n",
                v.sample_id, v.status, value, v.message
            ));
        }
    }

    Ok(out)
}
