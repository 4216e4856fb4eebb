mod helpers;
mod orders;
mod webhook;
