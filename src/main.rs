use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use filter_index::core::{keys, Filter, IndexedProfile, ItemType, REVERSE_FILTER_INDEXES};
use filter_index::storage::{DataStore, MemoryCache, MemoryStore, Snapshot};
use filter_index::{FilterIndexer, IndexerConfig};

/// filter-index: 过滤器索引的离线维护工具
#[derive(Parser, Debug)]
#[command(name = "filter-index")]
#[command(about = "Maintain forward / reverse filter indexes of a profile store")]
struct Cli {
    /// TOML 配置文件（默认 ~/.config/filter-index/config.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 导入过滤器与 profile（JSON），逐个建立索引
    Import { dataset: PathBuf },
    /// 重建某个作用域的正向索引
    Compute {
        #[arg(long)]
        item_type: String,
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value = "")]
        context: String,
        /// 逗号分隔；缺省表示该 tenant 下的全部 profile
        #[arg(long, value_delimiter = ',')]
        ids: Vec<String>,
    },
    /// 打印某个作用域下的全部正向桶
    Dump {
        #[arg(long)]
        item_type: String,
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value = "")]
        context: String,
    },
    /// 打印过滤器的反向引用
    Reverse {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        filter: String,
    },
    /// 删除 profile 及其索引
    RemoveProfile {
        #[arg(long)]
        item_type: String,
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        id: String,
    },
    /// 删除未被引用的过滤器
    RemoveFilter {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        id: String,
    },
    /// 存储概况
    Stats,
}

#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    filters: Vec<Filter>,
    #[serde(default)]
    profiles: Vec<DatasetProfile>,
}

#[derive(Debug, Deserialize)]
struct DatasetProfile {
    item_type: String,
    #[serde(flatten)]
    profile: IndexedProfile,
}

fn parse_item_type(short: &str) -> anyhow::Result<ItemType> {
    ItemType::by_short_name(short)
        .or_else(|| ItemType::by_name(short))
        .with_context(|| format!("unknown item type {short:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg_path = cli.config.clone().unwrap_or_else(IndexerConfig::default_path);
    let cfg = IndexerConfig::load(&cfg_path).with_context(|| format!("loading {cfg_path:?}"))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let snapshot = Snapshot::new(cfg.snapshot_path.clone());
    let store = Arc::new(snapshot.load_or_empty().await?);
    let cache = Arc::new(MemoryCache::new());
    let indexer = FilterIndexer::in_memory(store.clone(), cache.clone(), cfg);

    let dirty = match cli.command {
        Command::Import { dataset } => {
            import(&store, &indexer, dataset).await?;
            true
        }
        Command::Compute {
            item_type,
            tenant,
            context,
            ids,
        } => {
            let item_type = parse_item_type(&item_type)?;
            let ids = (!ids.is_empty()).then_some(ids);
            let processed = indexer.compute_registered(item_type, &tenant, &context, ids.as_deref())?;
            if !processed {
                println!("nothing to index for {} {}", item_type.short_name(), keys::scope_key(&tenant, &context));
            }
            processed
        }
        Command::Dump {
            item_type,
            tenant,
            context,
        } => {
            let item_type = parse_item_type(&item_type)?;
            let tnt_ctx = keys::scope_key(&tenant, &context);
            print_buckets(store.as_ref(), &cache, item_type.name, &tnt_ctx)?;
            false
        }
        Command::Reverse { tenant, filter } => {
            let tnt_fltr = keys::concat(&[tenant.as_str(), filter.as_str()]);
            print_buckets(store.as_ref(), &cache, REVERSE_FILTER_INDEXES, &tnt_fltr)?;
            false
        }
        Command::RemoveProfile { item_type, tenant, id } => {
            let item_type = parse_item_type(&item_type)?;
            let profile = store
                .get_profile(item_type, &tenant, &id)
                .with_context(|| format!("{} {tenant}:{id}", item_type.short_name()))?;
            indexer.remove_profile_indexes(item_type, &profile)?;
            store.remove_profile(item_type, &tenant, &id);
            true
        }
        Command::RemoveFilter { tenant, id } => {
            indexer.ensure_filter_unused(&tenant, &id)?;
            store
                .remove_filter(&tenant, &id)
                .with_context(|| format!("filter {tenant}:{id}"))?;
            true
        }
        Command::Stats => {
            let dump = store.dump();
            println!("filters:  {}", dump.filters.len());
            println!("profiles: {}", dump.profiles.len());
            println!("buckets:  {}", dump.indexes.len());
            false
        }
    };

    if dirty {
        snapshot.save(&store).await?;
        print!("{}", indexer.stats().report());
    }
    Ok(())
}

/// 先写过滤器（已有版本走级联重建），再写 profile
async fn import(store: &MemoryStore, indexer: &FilterIndexer, path: PathBuf) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {path:?}"))?;
    let dataset: Dataset =
        serde_json::from_str(&text).with_context(|| format!("parsing {path:?}"))?;

    for flt in dataset.filters {
        let old = match store.get_filter(&flt.tenant, &flt.id) {
            Ok(f) => Some(f),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        store.set_filter(flt.clone());
        indexer.update_filter_index(old.as_ref(), &flt)?;
    }

    let total = dataset.profiles.len();
    for entry in dataset.profiles {
        let item_type = parse_item_type(&entry.item_type)?;
        let profile = entry.profile;
        let old = match store.get_profile(item_type, &profile.tenant, &profile.id) {
            Ok(p) => Some(p),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        store.set_profile(item_type, profile.clone());
        indexer.index_profile(item_type, old.as_ref(), &profile)?;
    }
    info!("Imported {} profiles from {:?}", total, path);
    Ok(())
}

/// 读穿缓存：命中直接返回，未命中读存储后回填
fn print_buckets(
    store: &dyn DataStore,
    cache: &MemoryCache,
    item_type: &str,
    tnt_ctx: &str,
) -> anyhow::Result<()> {
    let buckets = match store.get_indexes(item_type, tnt_ctx, None) {
        Ok(b) => b,
        Err(e) if e.is_not_found() => {
            println!("{item_type} {tnt_ctx}: no buckets");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let mut rule_keys: Vec<&String> = buckets.keys().collect();
    rule_keys.sort();
    for rule_key in rule_keys {
        let cache_key = keys::concat(&[tnt_ctx, rule_key.as_str()]);
        let ids = match cache.get(item_type, &cache_key) {
            Some(ids) => ids,
            None => {
                let ids = buckets[rule_key].clone();
                cache.set(item_type, &cache_key, ids.clone());
                ids
            }
        };
        println!("{rule_key}\t{}", ids.as_slice().join(","));
    }
    Ok(())
}
