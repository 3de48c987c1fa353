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

//! Run the explorer web server

use eyre::Result;
use tbx_webui::WebUiBuilder;
use tracing::info;

use crate::ServeArgs;

/// Start the web server and block until Ctrl-C
pub async fn serve(args: ServeArgs) -> Result<()> {
    let webui = WebUiBuilder::new()
        .storage_dir(args.storage)
        .host(args.host)
        .port(args.port)
        .build()
        .await?;

    info!("Storage directory: {}", webui.store().root().display());
    println!("Traceback Explorer running on http://{}", webui.config().addr());
    webui.serve().await
}
