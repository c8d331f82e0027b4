//! Print the labeler service record advertising the fortune labels.

use anyhow::Result;
use fortune_labeler::fortune::definitions::labeler_service_record;

fn main() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&labeler_service_record())?);
    Ok(())
}
