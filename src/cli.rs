use clap::{Parser, Subcommand};

use crate::data_models::Category;

#[derive(Debug, Parser)]
#[command(name = "torrent-search-bot", version, about = "Telegram bot that searches a torrent listing site")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the Telegram bot (default)
    Bot,
    /// Run a single search and print the results
    Search {
        /// Search terms
        #[arg(required = true)]
        query: Vec<String>,

        /// Restrict the search to a category
        #[arg(short, long)]
        category: Option<Category>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the categories a search can be scoped to
    Categories,
}

impl Cli {
    pub fn command(&self) -> &Commands {
        self.command.as_ref().unwrap_or(&Commands::Bot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_bot() {
        let cli = Cli::parse_from(["torrent-search-bot"]);
        assert!(matches!(cli.command(), Commands::Bot));
    }

    #[test]
    fn test_search_args() {
        let cli = Cli::parse_from([
            "torrent-search-bot",
            "search",
            "--category",
            "Movies",
            "vikram",
            "2022",
        ]);
        match cli.command() {
            Commands::Search {
                query,
                category,
                json,
            } => {
                assert_eq!(query.join(" "), "vikram 2022");
                assert_eq!(*category, Some(Category::Movies));
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let res = Cli::try_parse_from(["torrent-search-bot", "search", "-c", "cartoons", "x"]);
        assert!(res.is_err());
    }
}
