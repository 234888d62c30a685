fn main() {
    fallwatch_lib::run()
}
