use crate::core::config::data::Config;

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.base_url {
            Some(url) => println!("  base-url: {url}"),
            None => println!("  base-url: (default: {})", self.base_url()),
        }
        match &self.default_kb {
            Some(kb) => println!("  default-kb: {kb}"),
            None => println!("  default-kb: (unset)"),
        }
        println!("  list-page-size: {}", self.list_page_size());
        println!("  request-timeout: {}s", self.request_timeout_secs());
        println!("  reply-mode: {}", self.reply_mode());
    }
}
