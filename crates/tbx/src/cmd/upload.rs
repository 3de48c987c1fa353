// TBX - Traceback Explorer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Upload dumps to an explorer

use std::path::Path;

use eyre::{Result, WrapErr};
use tbx_engine::decode_blob;
use tbx_uploader::{upload_df, upload_tb};
use tracing::info;

/// Upload a traceback dump file
pub async fn upload_traceback(file: &Path, id: &str, host: Option<&str>) -> Result<()> {
    let bytes = std::fs::read(file).wrap_err_with(|| format!("failed to read {}", file.display()))?;
    let snapshot = decode_blob(&bytes)?;
    info!("Uploading {} raised in {}", snapshot.exc_type.name, snapshot.tb.frame.code.name);

    let url = upload_tb(&snapshot, id, host).await?;
    println!("Traceback will be accessible at {url}");
    Ok(())
}

/// Upload a dataframe file without interpreting it
pub async fn upload_dataframe(file: &Path, id: &str, host: Option<&str>) -> Result<()> {
    let bytes = std::fs::read(file).wrap_err_with(|| format!("failed to read {}", file.display()))?;

    let url = upload_df(bytes, id, host).await?;
    println!("Dataframe will be accessible at {url}");
    Ok(())
}
