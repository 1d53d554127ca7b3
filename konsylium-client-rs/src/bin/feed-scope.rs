use std::error::Error;
use std::process;
use std::rc::Rc;
use std::sync::LazyLock;

use chrono::{Duration, Utc};
use konsylium_client::forum_types::chat::RawConversation;
use konsylium_client::forum_types::notification::RawNotification;
use konsylium_client::forum_types::post::RawPost;
use konsylium_client::forum_types::{PostFilter, decode_all};
use konsylium_client::tidings::{FeedItem, FetchOutcome, PaginationState};
use konsylium_client::{
    ClientConfig, ConversationList, ForumApi, HttpApi, MemoryForum, NotificationCenter, PostsFeed,
};
use serde_json::json;

// going through LOGGER keeps env_logger from being initialized twice
static LOGGER: LazyLock<()> = LazyLock::new(|| {
    env_logger::init();
    log::info!("Logging initialized");
});

const USAGE: &str = "Usage: feed-scope [posts|notifications|conversations] [--pages N] [--search TEXT] [--offline]";

#[derive(Clone, Copy, Debug)]
enum Listing {
    Posts,
    Notifications,
    Conversations,
}

struct Args {
    listing: Listing,
    pages: usize,
    search: Option<String>,
    offline: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args {
        listing: Listing::Posts,
        pages: 3,
        search: None,
        offline: false,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "posts" => parsed.listing = Listing::Posts,
            "notifications" => parsed.listing = Listing::Notifications,
            "conversations" => parsed.listing = Listing::Conversations,
            "--offline" => parsed.offline = true,
            "--pages" => {
                let value = args.next().ok_or("--pages needs a number")?;
                parsed.pages = value
                    .parse()
                    .map_err(|_| format!("--pages needs a number, got {value:?}"))?;
            }
            "--search" => {
                parsed.search = Some(args.next().ok_or("--search needs a value")?);
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
    }
    Ok(parsed)
}

fn describe(e: &dyn Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    message
}

fn print_page<T: FeedItem>(page: usize, outcome: FetchOutcome, state: &PaginationState<T>) {
    let cursor = state
        .cursor
        .map(|c| c.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    match outcome {
        FetchOutcome::Applied { added, duplicates } => println!(
            "  page {page}: +{added} ({duplicates} duplicates), {} held, cursor {cursor}, hasMore {}",
            state.items.len(),
            state.has_more
        ),
        other => println!("  page {page}: {other:?}"),
    }
}

async fn scope<A: ForumApi>(api: Rc<A>, args: &Args, config: &ClientConfig) -> Result<(), String> {
    match args.listing {
        Listing::Posts => {
            let mut filter = PostFilter::default();
            if let Some(search) = &args.search {
                filter = filter.search(search.clone());
            }
            let feed = PostsFeed::with_filter(api, filter);
            println!("Posts");
            for page in 1..=args.pages {
                let outcome = feed.load_more().await.map_err(|e| describe(&e))?;
                let state = feed.state();
                print_page(page, outcome, &state);
                if !state.has_more {
                    break;
                }
            }
            for post in feed.state().items.iter().take(5) {
                println!("    #{} {} by @{}", post.id, post.title, post.author.username);
            }
        }
        Listing::Notifications => {
            let center = NotificationCenter::new(api, config.notifications_page_size);
            println!("Notifications");
            for page in 1..=args.pages {
                let outcome = center.load_more().await.map_err(|e| describe(&e))?;
                let state = center.state();
                print_page(page, outcome, &state);
                if !state.has_more {
                    break;
                }
            }
            println!(
                "  unread: {} general, {} chat",
                center.unread_general(),
                center.unread_chat()
            );
        }
        Listing::Conversations => {
            let list = ConversationList::new(api);
            let count = list.load().await.map_err(|e| describe(&e))?;
            println!("Conversations ({count})");
            for conversation in list.items() {
                let last = conversation
                    .last_message_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!("  #{} last active {last}", conversation.id);
            }
        }
    }
    Ok(())
}

fn demo_forum() -> MemoryForum {
    let now = Utc::now();
    let minutes_ago = |n: i64| now - Duration::minutes(n);
    let forum = MemoryForum::new().with_page_size(10);

    let posts = (1..=25)
        .map(|i| {
            json!({
                "id": i,
                "title": format!("Question {i}"),
                "description": "Demo post",
                "createdAt": minutes_ago(i * 7),
                "users": {"id": i % 4 + 1, "username": format!("user{}", i % 4 + 1)},
                "post_votes": [{"userId": 1, "value": 1}],
            })
        })
        .collect();
    for post in decode_all::<RawPost>(posts) {
        forum.add_post(post);
    }

    let kinds = ["new_comment", "new_message", "comment_reply", "post_voted"];
    let notifications = (1..=20)
        .map(|i| {
            json!({
                "id": i,
                "type": kinds[i as usize % kinds.len()],
                "createdAt": minutes_ago(i * 3),
                "read": i % 3 == 0,
                "metadata": {"username": "anna", "postId": i, "conversationId": i % 2 + 1},
            })
        })
        .collect();
    for notification in decode_all::<RawNotification>(notifications) {
        forum.add_notification(notification);
    }

    let conversations = (1..=3)
        .map(|i| {
            json!({
                "id": i,
                "user1Id": 1,
                "user2Id": i + 1,
                "lastMessageAt": minutes_ago(i * 11),
            })
        })
        .collect();
    for conversation in decode_all::<RawConversation>(conversations) {
        forum.add_conversation(conversation);
    }
    forum
}

fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };
    LazyLock::force(&LOGGER);

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error reading configuration: {}", describe(&e));
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            process::exit(1);
        }
    };

    let result = if args.offline {
        println!("feed-scope (offline demo data)");
        runtime.block_on(scope(Rc::new(demo_forum()), &args, &config))
    } else {
        println!("feed-scope ({})", config.backend_url);
        match HttpApi::new(config.clone()) {
            Ok(api) => runtime.block_on(scope(Rc::new(api), &args, &config)),
            Err(e) => Err(describe(&e)),
        }
    };

    if let Err(message) = result {
        eprintln!("Error: {message}");
        process::exit(1);
    }
}
