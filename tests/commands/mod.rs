mod connect;
mod deploy;
mod destroy;
mod help;
mod list;
