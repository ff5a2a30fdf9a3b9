pub mod puppeteer;

pub use self::puppeteer::puppeteer;
