// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::settings::DatabaseSettings;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use std::time::Duration;
use tracing::info;

/// 连接存活上限
const MAX_LIFETIME: Duration = Duration::from_secs(3600);

/// 内存 SQLite 的每个连接都是独立的库
fn is_memory_sqlite(url: &str) -> bool {
    url.starts_with("sqlite::memory:") || url.contains("mode=memory")
}

/// 按配置构造连接参数
///
/// 内存 SQLite 固定为单连接；文件 SQLite 不存在时自动创建。
pub fn connect_options(settings: &DatabaseSettings) -> ConnectOptions {
    let mut url = settings.url.clone();
    if url.starts_with("sqlite:") && !is_memory_sqlite(&url) && !url.contains("mode=") {
        url.push_str(if url.contains('?') { "&mode=rwc" } else { "?mode=rwc" });
    }

    let mut opt = ConnectOptions::new(url.clone());
    if is_memory_sqlite(&url) {
        opt.max_connections(1).min_connections(1);
    } else {
        if let Some(max) = settings.max_connections {
            opt.max_connections(max);
        }
        if let Some(min) = settings.min_connections {
            opt.min_connections(min);
        }
        opt.max_lifetime(MAX_LIFETIME);
    }
    if let Some(timeout) = settings.connect_timeout.map(Duration::from_secs) {
        opt.connect_timeout(timeout).acquire_timeout(timeout);
    }
    if let Some(idle) = settings.idle_timeout {
        opt.idle_timeout(Duration::from_secs(idle));
    }
    opt.sqlx_logging(false);
    opt
}

/// 连接数据库并执行全部未应用的迁移
pub async fn connect_and_migrate(settings: &DatabaseSettings) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(connect_options(settings)).await?;
    Migrator::up(&db, None).await?;
    info!(backend = ?db.get_database_backend(), "数据库迁移完成");
    Ok(db)
}
