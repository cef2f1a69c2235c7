pub mod telegram_service;
